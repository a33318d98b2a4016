//! Error types for Astrochat
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Astrochat operations
///
/// This enum covers configuration loading, authentication, REST calls to the
/// backend, the chat transport, and frame decoding.
#[derive(Error, Debug)]
pub enum AstroChatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors (missing, expired or rejected tokens)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// No stored credentials are available
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Backend returned a non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the backend
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// Chat transport errors (construction, send, close)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected chat frames
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Message quota exhausted for the current plan
    #[error("Message limit exceeded: {0}")]
    LimitExceeded(String),

    /// Operation requires an open chat connection
    #[error("Not connected to chat server")]
    NotConnected,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// URL parsing errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for Astrochat operations
///
/// Uses `anyhow::Error` so callers can attach context while still being able
/// to downcast to [`AstroChatError`].
pub type Result<T> = anyhow::Result<T>;
