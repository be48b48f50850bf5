//! User-facing notifications derived from errors
//!
//! Front-ends never print raw errors. They ask [`notification_for`] whether
//! and how an error should be shown. Permission errors raised while an admin
//! is impersonating a less privileged user are expected and are suppressed;
//! every other error still surfaces.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorClass};

/// Severity of a transient notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A transient message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Whether an error is an expected side effect of impersonation
pub fn is_impersonation_noise(err: &ApiError, impersonating: bool) -> bool {
    impersonating && matches!(err, ApiError::Permission(_))
}

/// Decide how (and whether) to show an error
pub fn notification_for(err: &ApiError, impersonating: bool) -> Option<Notification> {
    if is_impersonation_noise(err, impersonating) {
        tracing::debug!("Suppressed permission error during impersonation: {}", err);
        return None;
    }

    let notification = match err.class() {
        ErrorClass::Transport => Notification::error(format!("Connection problem: {}", err)),
        ErrorClass::Permission => match err {
            ApiError::Unauthorized => Notification::warning("Please log in to continue"),
            _ => Notification::error(err.to_string()),
        },
        ErrorClass::Application => Notification::warning(err.to_string()),
        ErrorClass::Data => Notification::error(format!("Unexpected response: {}", err)),
    };
    Some(notification)
}
