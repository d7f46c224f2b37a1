//! Startup helpers for the parlance server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::config::Config;
use crate::server::{self, AppState};

/// Run the server until ctrl-c.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Starting parlance v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Ollama endpoint: {}", config.ollama_url);
    tracing::info!("Model: {}", config.model);
    tracing::info!("Database: {}", config.database_path);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!("Failed to create runtime: {err}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = rt.block_on(serve(&config)) {
        tracing::error!("Server error: {err}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn serve(config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state: Arc<AppState> = AppState::new(config).await?;
    server::run_server_with_shutdown(state, config.port, shutdown_signal()).await
}

/// Resolve when the process receives ctrl-c.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
    }
    tracing::info!("shutdown signal received");
}
