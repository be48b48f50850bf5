//! Error types for backend calls
//!
//! Every failure is classified into an [`ErrorClass`]. The notification layer
//! consults the class rather than matching on messages, see
//! [`crate::notify`].

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors that can occur when talking to the backend
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// Connection, DNS, TLS or mid-stream transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("Request timed out")]
    Timeout,

    /// Missing or expired credentials
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated but not allowed (e.g. "Superadmin access required")
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected by validation
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Backend asked us to slow down
    #[error("Rate limited{}", .retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Backend failure (5xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Error reported inside a chat stream chunk
    #[error("Stream error: {0}")]
    Stream(String),

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Client-side misconfiguration (bad URL, client build failure)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Retries exhausted on a retryable error
    #[error("Retry limit exceeded after {attempts} attempts: {last}")]
    RetryLimitExceeded { attempts: u32, last: String },
}

/// Coarse category used to decide how an error is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stream open failure, socket drop, timeouts
    Transport,
    /// Caller lacks credentials or rights
    Permission,
    /// Form/validation failures and missing resources
    Application,
    /// Malformed payloads
    Data,
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Network(_)
            | ApiError::Timeout
            | ApiError::RateLimited { .. }
            | ApiError::Server { .. }
            | ApiError::RetryLimitExceeded { .. } => ErrorClass::Transport,
            ApiError::Unauthorized | ApiError::Permission(_) => ErrorClass::Permission,
            ApiError::NotFound(_)
            | ApiError::Validation(_)
            | ApiError::Stream(_)
            | ApiError::Config(_) => ErrorClass::Application,
            ApiError::Decode(_) => ErrorClass::Data,
        }
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::Timeout
                | ApiError::RateLimited { .. }
                | ApiError::Server { .. }
        )
    }

    /// Map a non-success HTTP status and its body to an error
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let message = extract_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Permission(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { retry_after },
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Timeout,
            s if s.is_server_error() => ApiError::Server {
                status: s.as_u16(),
                message,
            },
            _ => ApiError::Validation(message),
        }
    }
}

/// Pull a human message out of `{"detail": ...}`, `{"message": ...}` or `{"error": ...}`
fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(trimmed.chars().take(300).collect());
    };
    ["detail", "message", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::Config(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::Config(format!("invalid URL: {}", err))
    }
}
