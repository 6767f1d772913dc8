//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use quiniela_shared::constants::{APP_NAME, DEFAULT_DATABASE_FILE, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./quiniela.db`
    pub database_path: PathBuf,

    /// Organizer API bearer token. Required to access /admin/* endpoints.
    /// Env: `ORGANIZER_TOKEN`
    /// Default: empty (organizer API disabled).
    pub organizer_token: Option<String>,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Quiniela"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from(".").join(DEFAULT_DATABASE_FILE),
            organizer_token: None,
            instance_name: APP_NAME.to_string(),
        }
    }
}

// The token never shows up in logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("organizer_token", &self.organizer_token.as_ref().map(|_| "<set>"))
            .field("instance_name", &self.instance_name)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }

        if let Some(token) = lookup("ORGANIZER_TOKEN") {
            if !token.is_empty() {
                config.organizer_token = Some(token);
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
