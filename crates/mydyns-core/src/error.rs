//! Error types for the mydyns system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for mydyns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the mydyns system
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing Basic credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Host/user not paired, or security value mismatch
    #[error("access denied: {0}")]
    Authorization(String),

    /// Token failed to decode or verify
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Malformed hostname or IP, missing required field
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The update queue is saturated
    #[error("update failed: {0}")]
    Backpressure(String),

    /// Rendering or running the external updater failed
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Token could not be produced
    #[error("failed to create token: {0}")]
    Signing(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an authorization error
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create an invalid token error
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a backpressure error
    pub fn backpressure(msg: impl Into<String>) -> Self {
        Self::Backpressure(msg.into())
    }

    /// Create a dispatch error
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Create a signing error
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is the caller's fault (4xx) rather than the server's
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::Authorization(_)
                | Self::InvalidToken(_)
                | Self::InvalidInput(_)
                | Self::Backpressure(_)
        )
    }
}
