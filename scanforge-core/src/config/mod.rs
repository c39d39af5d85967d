//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub queues: QueuesConfig,
    pub executions: ExecutionsConfig,
    pub logging: LoggingConfig,
}

/// Worker pool and job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    /// Number of concurrent workers consuming the tasks queue
    pub tasks_concurrency: usize,
    /// Number of concurrent workers consuming the executions queue
    pub executions_concurrency: usize,
    /// How long cached job results stay available to dependent jobs (in seconds)
    pub result_ttl_seconds: u64,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            tasks_concurrency: 2,
            executions_concurrency: 4,
            result_ttl_seconds: 7200,
        }
    }
}

impl QueuesConfig {
    /// Result TTL as a [`Duration`]
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_seconds)
    }
}

/// Tool execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionsConfig {
    /// Directory where tool report files are written
    pub reports_dir: PathBuf,
    /// Hard timeout applied to a single tool subprocess (in seconds)
    pub tool_timeout_seconds: u64,
}

impl Default for ExecutionsConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("reports"),
            tool_timeout_seconds: 7200,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter level (overridable via `RUST_LOG`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.queues.tasks_concurrency == 0 {
            return Err(ValidationError::new("queues.tasks_concurrency must be > 0"));
        }
        if self.queues.executions_concurrency == 0 {
            return Err(ValidationError::new(
                "queues.executions_concurrency must be > 0",
            ));
        }
        if self.queues.result_ttl_seconds == 0 {
            return Err(ValidationError::new("queues.result_ttl_seconds must be > 0"));
        }
        if self.executions.tool_timeout_seconds == 0 {
            return Err(ValidationError::new(
                "executions.tool_timeout_seconds must be > 0",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add local config and environment variables last (highest priority)
        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("SCANFORGE").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queues.result_ttl(), Duration::from_secs(7200));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.queues.executions_concurrency = 0;
        assert!(config.validate().is_err());
    }
}
