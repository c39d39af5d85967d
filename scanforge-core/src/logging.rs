//! Structured logging setup with tracing

use tracing_subscriber::EnvFilter;

/// Errors raised while initializing the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter directive: {0}")]
    InvalidFilter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Initialize the global tracing subscriber.
///
/// The `RUST_LOG` environment variable takes precedence over the configured
/// `level` so operators can raise verbosity without touching configuration
/// files.
pub fn init_tracing(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(())
}
