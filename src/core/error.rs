//! # Error Handling
//!
//! Every fallible operation in the crate returns [`ObservabilityResult`]. The
//! error enum is built with `thiserror`, so each variant carries its own
//! `Display` message and the usual `From` conversions let `?` do the work.
//!
//! Two kinds of failure never reach callers as an `Err`:
//! - a health probe that fails or panics is reported as an unhealthy result;
//! - lookups of unknown names return empty or zeroed data.

use thiserror::Error;

/// Main result type used throughout the crate
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

/// Error types for the observability core
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObservabilityError {
    /// Caller supplied input that violates an invariant (negative counter
    /// increment, empty name, non-positive timeout, ...)
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// Configuration errors (invalid file, bad environment override, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An exporter adapter could not publish a snapshot
    #[error("Export error ({exporter}): {message}")]
    Export { exporter: String, message: String },

    /// I/O errors (reading configuration files)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl ObservabilityError {
    /// Create a validation error for a named field
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an export error for the named exporter
    pub fn export<E: Into<String>, S: Into<String>>(exporter: E, message: S) -> Self {
        Self::Export {
            exporter: exporter.into(),
            message: message.into(),
        }
    }

    /// True for the validation kind
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Get a string representation of the error type, for structured reports
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Export { .. } => "export_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for ObservabilityError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ObservabilityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ObservabilityError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Convenience macro for creating validation errors
///
/// Usage: `validation_error!("value", "must be >= 0, got {}", v)`
#[macro_export]
macro_rules! validation_error {
    ($field:expr, $($arg:tt)*) => {
        $crate::core::error::ObservabilityError::validation($field, format!($($arg)*))
    };
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid log level: {}", level)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::ObservabilityError::config(format!($($arg)*))
    };
}
