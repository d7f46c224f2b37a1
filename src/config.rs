//! Environment-driven configuration.
//!
//! Every knob has a default matching the reference deployment; set the
//! `PARLANCE_*` variables to override.

use std::time::Duration;

use crate::llm::ollama::{DEFAULT_BASE_URL, DEFAULT_MODEL, GatewayConfig};

/// Environment variable for the HTTP listen port.
pub const PORT_ENV: &str = "PARLANCE_PORT";
/// Environment variable for the SQLite database path.
pub const DATABASE_ENV: &str = "PARLANCE_DB";
/// Environment variable for the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "PARLANCE_OLLAMA_URL";
/// Environment variable for the generation model name.
pub const MODEL_ENV: &str = "PARLANCE_MODEL";
/// Environment variable for the generation timeout in seconds.
pub const TIMEOUT_ENV: &str = "PARLANCE_OLLAMA_TIMEOUT_SECS";

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 8888;
/// Default SQLite database path.
pub const DEFAULT_DATABASE: &str = "chatapp.db";
/// Default generation timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration assembled from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// SQLite database path.
    pub database_path: String,
    /// Ollama base URL.
    pub ollama_url: String,
    /// Generation model name.
    pub model: String,
    /// Bound on a generation round trip, in seconds.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: DEFAULT_DATABASE.to_string(),
            ollama_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var(PORT_ENV)
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.port),
            database_path: std::env::var(DATABASE_ENV).unwrap_or(defaults.database_path),
            ollama_url: std::env::var(OLLAMA_URL_ENV).unwrap_or(defaults.ollama_url),
            model: std::env::var(MODEL_ENV).unwrap_or(defaults.model),
            timeout_secs: std::env::var(TIMEOUT_ENV)
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Gateway configuration slice of this config.
    #[must_use]
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.ollama_url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
