// Command handlers for the ragdesk CLI

pub mod admin;
pub mod auth;
pub mod chat;
pub mod collections;
pub mod config;
pub mod documents;
pub mod health;
pub mod prefs;
pub mod sessions;
pub mod usage;

pub use admin::{AdminAction, AdminCommand};
pub use auth::{AuthAction, AuthCommand};
pub use chat::ChatCommand;
pub use collections::{CollectionsAction, CollectionsCommand};
pub use config::{ConfigAction, ConfigCommand};
pub use documents::{DocumentsAction, DocumentsCommand};
pub use health::HealthCommand;
pub use prefs::{PrefsAction, PrefsCommand};
pub use sessions::{SessionsAction, SessionsCommand};
pub use usage::UsageCommand;

use crate::error::CliResult;

/// Trait for command handlers
#[async_trait::async_trait]
pub trait Command: Send + Sync {
    /// Execute the command
    async fn execute(&self) -> CliResult<()>;
}
