//! Configuration management for mailsync
//!
//! This module provides environment-based configuration management with
//! support for defaults, TOML files and validation.

use crate::core_sync::ConflictStrategy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sync cycle configuration
    pub sync: SyncConfig,

    /// Baseline persistence configuration
    pub baseline: BaselineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Sync cycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How bilateral edits of one record are settled
    pub conflict_strategy: ConflictStrategy,

    /// Upper bound for a replica read
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Upper bound for a replica apply or adopt
    #[serde(with = "humantime_serde")]
    pub apply_timeout: Duration,

    /// Pause between cycles when running continuously
    #[serde(with = "humantime_serde")]
    pub cycle_interval: Duration,
}

/// Baseline persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Directory holding one file per baseline slot
    pub state_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::Flag,
            read_timeout: Duration::from_secs(30),
            apply_timeout: Duration::from_secs(60),
            cycle_interval: Duration::from_secs(60),
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./mailsync-state"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

fn parse_duration(var: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", var, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: MAILSYNC_<SECTION>_<KEY>
    /// Example: MAILSYNC_SYNC_CYCLE_INTERVAL=5m
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `MAILSYNC_*` variables that are set
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Sync config
        if let Ok(strategy) = env::var("MAILSYNC_SYNC_CONFLICT_STRATEGY") {
            self.sync.conflict_strategy = ConflictStrategy::from_str(&strategy).ok_or_else(|| {
                ConfigError::InvalidValue(format!("Invalid conflict strategy: {}", strategy))
            })?;
        }
        if let Ok(timeout) = env::var("MAILSYNC_SYNC_READ_TIMEOUT") {
            self.sync.read_timeout = parse_duration("read timeout", &timeout)?;
        }
        if let Ok(timeout) = env::var("MAILSYNC_SYNC_APPLY_TIMEOUT") {
            self.sync.apply_timeout = parse_duration("apply timeout", &timeout)?;
        }
        if let Ok(interval) = env::var("MAILSYNC_SYNC_CYCLE_INTERVAL") {
            self.sync.cycle_interval = parse_duration("cycle interval", &interval)?;
        }

        // Baseline config
        if let Ok(dir) = env::var("MAILSYNC_BASELINE_STATE_DIR") {
            self.baseline.state_dir = PathBuf::from(dir);
        }

        // Logging config
        if let Ok(level) = env::var("MAILSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = env::var("MAILSYNC_LOG_JSON") {
            self.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.read_timeout.is_zero() || self.sync.apply_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "store timeouts must be greater than 0".to_string(),
            ));
        }

        if self.sync.cycle_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "cycle_interval must be greater than 0".to_string(),
            ));
        }

        if self.baseline.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "baseline state_dir must not be empty".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
