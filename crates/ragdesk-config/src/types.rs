//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Backend endpoints and HTTP behaviour
    pub api: ApiSettings,
    /// Chat input and persistence timings
    pub chat: ChatSettings,
    /// Health socket behaviour
    pub health: HealthSettings,
    /// Local storage location
    pub storage: StorageSettings,
    /// Log level for the terminal front-end (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            chat: ChatSettings::default(),
            health: HealthSettings::default(),
            storage: StorageSettings::default(),
            log_level: "warn".to_string(),
        }
    }
}

/// Backend endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    /// REST and streaming base URL
    pub base_url: String,
    /// WebSocket URL for health pushes; derived from `base_url` when unset
    pub ws_url: Option<String>,
    /// Per-request timeout in seconds (not applied to chat streams)
    pub timeout_secs: u64,
    /// Retries for idempotent requests
    pub retry_count: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_url: None,
            timeout_secs: 30,
            retry_count: 2,
        }
    }
}

impl ApiSettings {
    /// Health WebSocket URL, either configured or derived from the base URL
    pub fn health_ws_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws/health", ws_base)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Chat behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatSettings {
    /// Default chat mode sent with every request ("chat", "rag", ...)
    pub mode: String,
    /// Ask the backend for ReAct-style reasoning
    pub use_react: bool,
    /// Debounce before persisting the current session's messages
    pub save_debounce_ms: u64,
    /// Quiet period before computing input suggestions
    pub suggestion_debounce_ms: u64,
    /// Maximum remembered inputs
    pub history_max: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            mode: "chat".to_string(),
            use_react: false,
            save_debounce_ms: 2000,
            suggestion_debounce_ms: 300,
            history_max: 50,
        }
    }
}

impl ChatSettings {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn suggestion_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }
}

/// Health monitor behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthSettings {
    /// Periodic ping interval in seconds
    pub ping_interval_secs: u64,
    /// Window in which on-demand pings are coalesced
    pub ping_coalesce_ms: u64,
    /// First reconnect delay
    pub reconnect_initial_ms: u64,
    /// Reconnect delay ceiling
    pub reconnect_max_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            ping_coalesce_ms: 500,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 30_000,
        }
    }
}

/// Local storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for client state; platform data dir when unset
    pub data_dir: Option<PathBuf>,
}
