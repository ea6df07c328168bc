//! Desk configuration loaded from environment variables.

use crate::error::{DeskError, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// Server bind address (host:port)
    pub bind_address: String,

    /// Process-wide debug flag; gates diagnostic logging
    pub debug: bool,

    /// Simulated round trip for login/register
    pub auth_delay: Duration,

    /// bcrypt cost for stored credentials
    pub bcrypt_cost: u32,

    /// Department shown to admins who have none and pass none
    pub default_department: String,

    /// Seed demo identities and cases at startup
    pub seed_demo_data: bool,

    /// How long a resolve/delete confirmation token stays valid
    pub confirmation_ttl: Duration,
}

impl Default for DeskConfig {
    fn default() -> Self {
        DeskConfig {
            bind_address: "0.0.0.0:8000".to_string(),
            debug: false,
            auth_delay: Duration::from_millis(500),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            default_department: "Hostel".to_string(),
            seed_demo_data: true,
            confirmation_ttl: Duration::from_secs(600),
        }
    }
}

impl DeskConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DeskConfig::default();
        let auth_delay_ms = match lookup("AUTH_DELAY_MS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map_err(|_| DeskError::Config(format!("AUTH_DELAY_MS '{}' is not a number", v)))?,
            None => defaults.auth_delay.as_millis() as u64,
        };
        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .map_err(|_| DeskError::Config(format!("BCRYPT_COST '{}' is not a number", v)))?
                .clamp(4, 31),
            None => defaults.bcrypt_cost,
        };
        let confirmation_ttl = match lookup("CONFIRMATION_TTL_SECS") {
            Some(v) => Duration::from_secs(v.trim().parse::<u64>().map_err(|_| {
                DeskError::Config(format!("CONFIRMATION_TTL_SECS '{}' is not a number", v))
            })?),
            None => defaults.confirmation_ttl,
        };

        Ok(DeskConfig {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            debug: lookup("GRIEVANCE_DEBUG").map(|v| flag(&v)).unwrap_or(false),
            auth_delay: Duration::from_millis(auth_delay_ms),
            bcrypt_cost,
            default_department: lookup("DEFAULT_DEPARTMENT")
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(defaults.default_department),
            seed_demo_data: lookup("SEED_DEMO_DATA").map(|v| flag(&v)).unwrap_or(true),
            confirmation_ttl,
        })
    }

    /// Log filter used when RUST_LOG is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "grievance_desk=debug,tower_http=debug"
        } else {
            "grievance_desk=info"
        }
    }
}

fn flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
