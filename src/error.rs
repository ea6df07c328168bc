//! Desk error taxonomy and result alias.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeskError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeskError {
    /// Bad environment configuration at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Case or identity lookup by id failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or malformed input; nothing was mutated
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Bad credentials, or a missing/unknown session token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Session role does not match the tool being called
    #[error("Access denied: {0}")]
    Authorization(String),

    /// Duplicate identity or stale version stamp
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Status change not allowed by the case state machine
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeskError {
    /// JSON-RPC error code for the `tools/call` envelope.
    pub fn rpc_code(&self) -> i64 {
        match self {
            DeskError::Validation(_) => -32602,
            DeskError::Authentication(_) => -32001,
            DeskError::Authorization(_) => -32003,
            DeskError::NotFound(_) => -32004,
            DeskError::Conflict(_) | DeskError::InvalidTransition(_) => -32009,
            DeskError::Config(_) | DeskError::Internal(_) => -32603,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeskError::Config(_) => "CONFIG_ERROR",
            DeskError::NotFound(_) => "NOT_FOUND",
            DeskError::Validation(_) => "VALIDATION_ERROR",
            DeskError::Authentication(_) => "AUTH_ERROR",
            DeskError::Authorization(_) => "FORBIDDEN",
            DeskError::Conflict(_) => "CONFLICT",
            DeskError::InvalidTransition(_) => "INVALID_TRANSITION",
            DeskError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<bcrypt::BcryptError> for DeskError {
    fn from(e: bcrypt::BcryptError) -> Self {
        DeskError::Internal(format!("password hashing failed: {}", e))
    }
}

impl From<serde_json::Error> for DeskError {
    fn from(e: serde_json::Error) -> Self {
        DeskError::Validation(format!("malformed arguments: {}", e))
    }
}
