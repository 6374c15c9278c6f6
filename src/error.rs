//! Error types and handling for Ampsim
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Ampsim operations
pub type Result<T> = std::result::Result<T, AmpsimError>;

/// Main error type for Ampsim
#[derive(Debug, Error)]
pub enum AmpsimError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Session persistence errors
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AmpsimError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AmpsimError::Config {
            message: message.into(),
        }
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        AmpsimError::Persistence {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        AmpsimError::Web {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AmpsimError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AmpsimError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AmpsimError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AmpsimError {
    fn from(err: std::io::Error) -> Self {
        AmpsimError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AmpsimError {
    fn from(err: serde_yaml::Error) -> Self {
        AmpsimError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AmpsimError {
    fn from(err: serde_json::Error) -> Self {
        AmpsimError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for AmpsimError {
    fn from(err: chrono::ParseError) -> Self {
        AmpsimError::validation("datetime", &err.to_string())
    }
}
