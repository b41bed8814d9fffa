//! Error types for ephemeral-nats

use std::time::Duration;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for side channel operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("No reply on {subject} within {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    /// The remote side rejected the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Applying a log level locally failed.
    #[error("Log level control error: {0}")]
    Control(String),
}
