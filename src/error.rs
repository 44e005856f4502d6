//! Error types for Attache
//!
//! This module defines all error types used throughout the service,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Attache operations
///
/// This enum encompasses all possible errors that can occur during
/// agent execution, credential handling, session persistence, provider
/// interactions, and tool execution.
#[derive(Error, Debug)]
pub enum AttacheError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-related errors (model API calls, malformed responses)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Authentication errors (missing token, failed refresh or exchange)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Session persistence errors
    #[error("Session error: {0}")]
    Session(String),

    /// Usage recording errors
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Attache operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = AttacheError::Config("missing client id".to_string());
        assert_eq!(error.to_string(), "Configuration error: missing client id");
    }

    #[test]
    fn test_provider_error_display() {
        let error = AttacheError::Provider("API timeout".to_string());
        assert_eq!(error.to_string(), "Provider error: API timeout");
    }

    #[test]
    fn test_authentication_error_display() {
        let error = AttacheError::Authentication("token expired".to_string());
        assert_eq!(error.to_string(), "Authentication error: token expired");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: AttacheError = io_error.into();
        assert!(matches!(error, AttacheError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{bad json}").unwrap_err();
        let error: AttacheError = json_error.into();
        assert!(matches!(error, AttacheError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AttacheError>();
    }
}
