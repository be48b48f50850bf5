//! Error types for session operations

use ragdesk_api::ApiError;
use ragdesk_common::StorageError;
use thiserror::Error;

/// Errors that can occur in session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Local storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Session id unknown locally and remotely
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A response is still streaming into the current session
    #[error("A response is still streaming")]
    StreamInFlight,

    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
