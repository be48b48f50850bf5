// CLI error type and user-facing messages

use ragdesk_api::ApiError;
use ragdesk_common::StorageError;
use ragdesk_config::ConfigError;
use ragdesk_health::HealthError;
use ragdesk_sessions::SessionError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Api(ApiError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Health monitor error: {0}")]
    Health(String),

    /// The command needs a logged-in user
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CliError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            CliError::InvalidArgument { message } => {
                format!(
                    "Invalid argument: {}\n\nRun 'ragdesk --help' for usage information.",
                    message
                )
            }
            CliError::Io(e) => format!("File operation failed: {}", e),
            CliError::Config(msg) => {
                format!(
                    "Configuration error: {}\n\nRun 'ragdesk config show' to check your configuration.",
                    msg
                )
            }
            CliError::Storage(msg) => {
                format!("Storage error: {}\n\nCheck storage.data_dir in your configuration.", msg)
            }
            CliError::Api(ApiError::Unauthorized) | CliError::NotLoggedIn => {
                "You are not logged in or your session expired.\n\nRun 'ragdesk login <email>' first."
                    .to_string()
            }
            CliError::Api(ApiError::Permission(msg)) => {
                format!("Permission denied: {}", msg)
            }
            CliError::Api(e @ ApiError::Network(_)) | CliError::Api(e @ ApiError::Timeout) => {
                format!(
                    "{}\n\nCheck that the backend is running and api.base_url is correct.",
                    e
                )
            }
            CliError::Api(e) => e.to_string(),
            CliError::Session(msg) => msg.clone(),
            CliError::Health(msg) => format!("Health monitor error: {}", msg),
            CliError::Internal(msg) => {
                format!("Internal error: {}\n\nPlease report this issue.", msg)
            }
        }
    }

    /// Get technical details for verbose mode
    pub fn technical_details(&self) -> String {
        format!("{:?}", self)
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        CliError::Api(err)
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<StorageError> for CliError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotPermitted(msg) => CliError::Api(ApiError::Permission(msg)),
            other => CliError::Storage(other.to_string()),
        }
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Api(e) => CliError::Api(e),
            SessionError::Storage(e) => e.into(),
            other => CliError::Session(other.to_string()),
        }
    }
}

impl From<HealthError> for CliError {
    fn from(err: HealthError) -> Self {
        CliError::Health(err.to_string())
    }
}

impl From<rustyline::error::ReadlineError> for CliError {
    fn from(err: rustyline::error::ReadlineError) -> Self {
        CliError::Internal(format!("line editor: {}", err))
    }
}

pub type CliResult<T> = Result<T, CliError>;
