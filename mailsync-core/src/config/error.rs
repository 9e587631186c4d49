//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(String),

    #[error("Failed to write config file: {0}")]
    FileWriteError(String),

    #[error("Malformed config file: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    /// A `MAILSYNC_*` variable held an unparsable value
    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Config validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::ValidationFailed("cycle_interval must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Config validation failed: cycle_interval must be greater than 0"
        );
    }
}
