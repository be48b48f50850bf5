//! Configuration manager implementation

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    types::AppConfig,
};

const ENV_PREFIX: &str = "RAGDESK";

/// Loads, validates and saves [`AppConfig`]
pub struct ConfigManager {
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Manager for the default config file location
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Manager for a specific config file
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Override the environment prefix (mainly for tests)
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// `<config_dir>/ragdesk/config.toml`
    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ragdesk")
            .join("config.toml")
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file (if present) and environment overrides, then validate
    ///
    /// Nested keys use a double underscore: `RAGDESK__API__BASE_URL`.
    pub fn load(&self) -> Result<AppConfig> {
        let builder = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        self.validate(&config)?;
        debug!("Loaded configuration from {:?}", self.config_path);
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        self.validate(config)?;
        let toml = toml::to_string_pretty(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }

    pub fn validate(&self, config: &AppConfig) -> Result<()> {
        url::Url::parse(&config.api.base_url).map_err(|e| {
            ConfigError::Validation(format!("api.base_url '{}': {}", config.api.base_url, e))
        })?;
        if let Some(ws) = &config.api.ws_url {
            let parsed = url::Url::parse(ws)
                .map_err(|e| ConfigError::Validation(format!("api.ws_url '{}': {}", ws, e)))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ConfigError::Validation(
                    "api.ws_url must use ws:// or wss://".to_string(),
                ));
            }
        }
        if config.chat.history_max == 0 {
            return Err(ConfigError::Validation(
                "chat.history_max must be greater than 0".to_string(),
            ));
        }
        if config.health.reconnect_initial_ms == 0
            || config.health.reconnect_max_ms < config.health.reconnect_initial_ms
        {
            return Err(ConfigError::Validation(
                "health reconnect delays must be positive and max >= initial".to_string(),
            ));
        }
        if !matches!(
            config.log_level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::Validation(format!(
                "unknown log_level '{}'",
                config.log_level
            )));
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
