//! Logging subsystem for mailsync
//!
//! Sync components log through `tracing` macros with structured fields
//! (`side`, `id`, `cycle`). This module installs the global subscriber:
//! an `EnvFilter` (`RUST_LOG` wins over the configured level) and a fmt
//! layer, plain or JSON.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// The minimum log level for mailsync's own events
    pub level: LogLevel,
    /// Whether to include target module information
    pub with_target: bool,
    /// Whether to use JSON formatting
    pub json_format: bool,
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            with_target: true,
            json_format: false,
        }
    }

    /// Build from the `[logging]` section of the application config
    pub fn from_config(config: &LoggingConfig) -> Result<Self, LoggingError> {
        let level = LogLevel::from_str(&config.level).ok_or_else(|| {
            LoggingError::InvalidConfiguration(format!("unknown level '{}'", config.level))
        })?;
        Ok(Self::new(level)
            .with_target(config.with_target)
            .json_format(config.json_format))
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.filter_directive()))
    }
}

/// Initialize the logging subsystem with default configuration
///
/// # Example
/// ```
/// use mailsync_core::logging::init_logging;
///
/// init_logging().expect("Failed to initialize logging");
/// ```
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::new(LogLevel::Info))
}

/// Initialize the logging subsystem with custom configuration
///
/// # Example
/// ```
/// use mailsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
///
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let fmt_layer = fmt::layer().with_target(config.with_target);

    if config.json_format {
        tracing_subscriber::registry()
            .with(config.env_filter())
            .with(fmt_layer.json())
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(config.env_filter())
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    }

    Ok(())
}
