//! Configuration Error Types
//!
//! Errors raised while loading and validating [`QueueConfig`](super::QueueConfig).

use crate::error::QueueError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration path exists but is not a directory
    #[error("Configuration path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Source merge or deserialization failure from the `config` crate
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    /// Create a missing required field error
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }
}

impl From<ConfigurationError> for QueueError {
    fn from(err: ConfigurationError) -> Self {
        QueueError::Configuration(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err =
            ConfigurationError::invalid_value("scheduler.reset_hour", "25", "hour must be 0-23");
        assert_eq!(
            err.to_string(),
            "Invalid value '25' for field 'scheduler.reset_hour': hour must be 0-23"
        );
    }

    #[test]
    fn test_converts_into_queue_error() {
        let err: QueueError =
            ConfigurationError::missing_required_field("database.url", "database configuration")
                .into();
        assert!(matches!(err, QueueError::Configuration(msg) if msg.contains("database.url")));
    }
}
