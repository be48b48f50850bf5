//! ragdesk configuration
//!
//! Loads [`AppConfig`] from a TOML file layered under `RAGDESK__*`
//! environment variables, validates it and writes it back.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::ConfigManager;
pub use types::{ApiSettings, AppConfig, ChatSettings, HealthSettings, StorageSettings};
