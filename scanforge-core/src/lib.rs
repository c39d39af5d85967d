//! Scanforge Core - Foundation crate for the Scanforge scanning orchestrator
//!
//! This crate provides the shared domain used by the scheduling engine:
//!
//! # Modules
//!
//! - [`config`] — Strongly-typed configuration with file and environment variable support
//! - [`domain`] — Targets, findings, user-supplied parameters, input-type metadata,
//!   the tool/argument catalog and command-line rendering
//! - [`logging`] — Structured logging with tracing
//!
//! # Configuration
//!
//! Load configuration from files and environment:
//!
//! ```rust,ignore
//! use scanforge_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `SCANFORGE__` prefix with double underscore
//! separators:
//!
//! ```bash
//! SCANFORGE__QUEUES__EXECUTIONS_CONCURRENCY=8
//! SCANFORGE__LOGGING__LEVEL=debug
//! ```
//!
//! # Logging
//!
//! Initialize structured logging:
//!
//! ```rust,ignore
//! use scanforge_core::init_tracing;
//!
//! init_tracing("info")?;
//! ```

pub mod config;
pub mod domain;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
