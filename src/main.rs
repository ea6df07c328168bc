mod config;
mod controllers;
mod directory;
mod error;
mod models;
mod state;
mod views;

use crate::config::DeskConfig;
use crate::state::Desk;
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenv::dotenv().ok();
    let config = DeskConfig::from_env()?;

    // Initialize tracing; RUST_LOG wins over the debug flag
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_filter().into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting grievance-desk");

    let addr: SocketAddr = config.bind_address.parse()?;
    let desk = Desk::new(config)?;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/rpc", post(rpc_handler))
        .layer(Extension(desk));

    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn rpc_handler(
    Extension(desk): Extension<Desk>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    // Arguments carry passwords; log the method and tool only.
    tracing::debug!(
        "Received RPC {} {}",
        payload.get("method").and_then(|v| v.as_str()).unwrap_or("-"),
        payload
            .pointer("/params/name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    );
    let response = controllers::handle_rpc_request(desk, payload).await;
    Json(response)
}
