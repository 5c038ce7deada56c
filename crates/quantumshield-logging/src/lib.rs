//! Structured logging for QuantumShield
//!
//! Every identity, channel and package operation emits `tracing` events with
//! structured fields. This crate wires those events to JSONL or pretty
//! console output and to rotated JSONL files.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **Identity Context Injection**: Attach the acting identity to every span
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use quantumshield_logging::{LogConfig, ShieldSubscriberBuilder};
//!
//! // Simple setup with defaults (JSONL to console)
//! ShieldSubscriberBuilder::new().init()?;
//!
//! // Development mode with pretty human-readable output
//! ShieldSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! # Identity Context
//!
//! ```ignore
//! use quantumshield_logging::IdentityContextGuard;
//!
//! let _guard = IdentityContextGuard::with_label(&id, "Alice");
//! tracing::info!("identity created");
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{
    CRYPTO_TARGET, ConsoleFormat, FileConfig, IDENTITY_TARGET, JsonlConfig, LogConfig,
    RotationStrategy,
};
pub use context::{IdentityContextData, IdentityContextGuard};
pub use layers::{IdentityContextExtension, IdentityContextLayer};
pub use tracing_appender::non_blocking::WorkerGuard;

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid filter directive: {0}")]
    Filter(String),

    #[error("Log file setup failed: {0}")]
    File(String),

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

impl From<std::io::Error> for LoggingError {
    fn from(err: std::io::Error) -> Self {
        LoggingError::File(err.to_string())
    }
}

impl From<tracing_appender::rolling::InitError> for LoggingError {
    fn from(err: tracing_appender::rolling::InitError) -> Self {
        LoggingError::File(err.to_string())
    }
}

/// Builder for configuring and initializing the QuantumShield subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct ShieldSubscriberBuilder {
    config: LogConfig,
}

impl ShieldSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the level for targets without their own entry
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Set the level for a single target
    pub fn with_target_level(
        mut self,
        target: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        self.config = self.config.with_target_level(target, level);
        self
    }

    /// Set the level of identity, channel and package events
    pub fn with_identity_level(mut self, level: impl Into<String>) -> Self {
        self.config = self.config.with_identity_level(level);
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.config.filter_directives())
                .map_err(|e| LoggingError::Filter(e.to_string())),
        }
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output on drop and must be kept alive
    /// for the duration of the program when file output is configured.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = self.env_filter()?;

        let (file_writer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = file_writer(file_config)?;
                (Some(writer), Some(guard))
            }
            None => (None, None),
        };

        let jsonl = &self.config.jsonl;
        let registry = Registry::default()
            .with(env_filter)
            .with(IdentityContextLayer::new());

        let installed = match self.config.console {
            ConsoleFormat::Pretty { ansi } => registry
                .with(fmt::layer().with_ansi(ansi).with_target(true))
                .with(file_writer.map(|w| layers::jsonl_layer(w, jsonl)))
                .try_init(),
            ConsoleFormat::Jsonl => registry
                .with(layers::jsonl_layer(std::io::stdout, jsonl))
                .with(file_writer.map(|w| layers::jsonl_layer(w, jsonl)))
                .try_init(),
            ConsoleFormat::Off => registry
                .with(file_writer.map(|w| layers::jsonl_layer(w, jsonl)))
                .try_init(),
        };
        installed.map_err(|_| LoggingError::AlreadyInitialized)?;

        Ok(guard)
    }
}

impl Default for ShieldSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    std::fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => Rotation::NEVER,
    };
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.clone())
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Result<(), LoggingError> {
    ShieldSubscriberBuilder::new().init().map(|_| ())
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Result<(), LoggingError> {
    ShieldSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from many tests; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = ShieldSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
