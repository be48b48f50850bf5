//! Shared state every command runs against
//!
//! Built once per invocation from the loaded configuration: client storage,
//! the restored authentication state and the backend client.

use std::path::PathBuf;
use std::sync::Arc;

use ragdesk_api::{clear_session, restore_session, save_session, ApiClient, ClientConfig};
use ragdesk_common::{AuthSession, AuthState, ClientStorage, Preferences};
use ragdesk_config::{AppConfig, ConfigManager};
use ragdesk_health::{HealthMonitor, MonitorConfig, WsHealthTransport};
use ragdesk_sessions::{
    ChatOptions, ChatStore, EventBus, LocalSessionStore, RemoteSessions, StoreConfig,
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

/// Storage key for the admin session kept while impersonating
pub const IMPERSONATION_ORIGIN_KEY: &str = "impersonation_origin";

pub struct AppContext {
    pub config: AppConfig,
    pub config_manager: ConfigManager,
    pub storage: ClientStorage,
    pub prefs: Preferences,
    pub auth: AuthState,
    pub client: Arc<ApiClient>,
    pub style: OutputStyle,
}

impl AppContext {
    /// Load configuration and restore any saved login
    pub fn load(config_path: Option<PathBuf>, base_url: Option<String>) -> CliResult<Self> {
        let manager = match config_path {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new(),
        };
        let mut config = manager.load()?;
        if let Some(url) = base_url {
            config.api.base_url = url;
            manager.validate(&config)?;
        }
        Self::from_config(config, manager)
    }

    pub fn from_config(config: AppConfig, config_manager: ConfigManager) -> CliResult<Self> {
        let storage = match &config.storage.data_dir {
            Some(dir) => ClientStorage::open(dir)?,
            None => ClientStorage::open_default()?,
        };
        let prefs = Preferences::new(storage.clone());
        let auth = AuthState::new();

        let client_config = ClientConfig::new(config.api.base_url.clone())
            .with_timeout(config.api.timeout())
            .with_retry_count(config.api.retry_count);
        let client = Arc::new(ApiClient::new(client_config, auth.clone())?);
        client.set_guest_email(prefs.guest_email());

        if let Some(mut session) = restore_session(&storage) {
            if let Some(origin) = storage.get_lossy::<AuthSession>(IMPERSONATION_ORIGIN_KEY) {
                debug!("Resuming impersonation of {}", session.user.email);
                session.impersonating = Some(session.user.email.clone());
                client.resume_impersonation(origin);
            }
            auth.login(session);
        }

        Ok(Self {
            config,
            config_manager,
            storage,
            prefs,
            auth,
            client,
            style: OutputStyle::default(),
        })
    }

    /// Current session or [`CliError::NotLoggedIn`]
    pub fn require_login(&self) -> CliResult<AuthSession> {
        self.auth.current().ok_or(CliError::NotLoggedIn)
    }

    /// Write the in-memory login (and impersonation origin) to storage
    pub fn persist_auth(&self) -> CliResult<()> {
        match self.auth.current() {
            Some(session) => save_session(&self.storage, &session)?,
            None => clear_session(&self.storage),
        }
        match self.client.impersonation_origin() {
            Some(origin) => self.storage.set(IMPERSONATION_ORIGIN_KEY, &origin)?,
            None => {
                if let Err(e) = self.storage.remove(IMPERSONATION_ORIGIN_KEY) {
                    warn!("Failed to clear impersonation origin: {}", e);
                }
            }
        }
        Ok(())
    }

    pub fn chat_store(&self) -> Arc<ChatStore> {
        let remote: Arc<dyn RemoteSessions> = self.client.clone();
        ChatStore::new(
            StoreConfig {
                save_debounce: self.config.chat.save_debounce(),
            },
            LocalSessionStore::new(self.storage.clone()),
            Some(remote),
            self.auth.clone(),
            EventBus::new(),
        )
    }

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            mode: self.config.chat.mode.clone(),
            use_react: self.config.chat.use_react,
            collection_id: None,
        }
    }

    pub fn health_monitor(&self) -> CliResult<HealthMonitor> {
        let url = self.config.api.health_ws_url();
        let transport = WsHealthTransport::new(&url)?.with_auth(self.auth.clone());
        let health = &self.config.health;
        let config = MonitorConfig {
            ping_interval: Duration::from_secs(health.ping_interval_secs.max(1)),
            ping_coalesce: Duration::from_millis(health.ping_coalesce_ms),
            reconnect_initial: Duration::from_millis(health.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(health.reconnect_max_ms),
        };
        Ok(HealthMonitor::new(Arc::new(transport), config))
    }
}
