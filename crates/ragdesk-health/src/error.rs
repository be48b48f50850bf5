//! Error types for the health monitor

use thiserror::Error;

/// Errors raised by the health socket
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("Invalid health socket URL: {0}")]
    InvalidUrl(String),

    /// Opening the socket failed
    #[error("Health socket connect failed: {0}")]
    Connect(String),

    #[error("Health socket send failed: {0}")]
    Send(String),

    #[error("Health socket receive failed: {0}")]
    Receive(String),

    /// The server closed the socket
    #[error("Health socket closed")]
    Closed,
}

/// Result type for health operations
pub type Result<T> = std::result::Result<T, HealthError>;
