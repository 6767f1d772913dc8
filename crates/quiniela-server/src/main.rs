//! # quiniela-server
//!
//! HTTP front end for prediction contests.
//!
//! This binary provides:
//! - **Public API** for registration, event entry, prediction submission,
//!   personal results and the published ranking
//! - **Organizer API** (bearer token) for tickets, event authoring, match
//!   results and visibility toggles
//!
//! All state lives in one SQLite file handled by `quiniela-store`.

mod api;
mod config;
mod error;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,quiniela_server=debug,quiniela_store=debug")
        }))
        .init();

    info!("Starting Quiniela server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.organizer_token.is_none() {
        tracing::warn!("ORGANIZER_TOKEN is not set, organizer API disabled");
    }

    // -----------------------------------------------------------------------
    // 3. Open the database (runs pending migrations)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let app_state = AppState::open(config)?;

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
