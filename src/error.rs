//! Error types for Board Core.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for Board operations
pub type BoardResult<T> = Result<T, BoardError>;

/// Main error type for Board operations
#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// The remote store accepted the connection but rejected the request.
    #[error("Remote store error: {0}")]
    Remote(String),

    /// The request never reached the remote store.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl BoardError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BoardError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new remote store error
    pub fn remote(message: impl Into<String>) -> Self {
        BoardError::Remote(message.into())
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        BoardError::Network(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = BoardError::validation("text", "too long");
        assert_eq!(err.to_string(), "Validation error in text: too long");
    }

    #[test]
    fn test_remote_error_constructor() {
        let err = BoardError::remote("insert rejected");
        assert!(matches!(err, BoardError::Remote(_)));
    }
}
