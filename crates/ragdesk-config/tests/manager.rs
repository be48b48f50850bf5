use std::fs;

use ragdesk_config::{AppConfig, ConfigError, ConfigManager};
use tempfile::TempDir;

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::with_path(dir.path().join("config.toml"))
        .with_env_prefix("RAGDESK_TEST_MISSING");

    let config = manager.load().unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
log_level = "debug"

[api]
base_url = "https://chat.example.com"

[chat]
history_max = 10
"#,
    )
    .unwrap();

    let config = ConfigManager::with_path(path)
        .with_env_prefix("RAGDESK_TEST_PARTIAL")
        .load()
        .unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.api.base_url, "https://chat.example.com");
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.chat.history_max, 10);
    assert_eq!(config.chat.save_debounce_ms, 2000);
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let manager = ConfigManager::with_path(path).with_env_prefix("RAGDESK_TEST_SAVE");

    let mut config = AppConfig::default();
    config.chat.mode = "rag".to_string();
    config.health.ping_interval_secs = 5;
    manager.save(&config).unwrap();

    assert_eq!(manager.load().unwrap(), config);
}

#[test]
fn test_validation_rejects_bad_values() {
    let manager = ConfigManager::new();

    let mut config = AppConfig::default();
    config.api.base_url = "not a url".to_string();
    assert!(matches!(manager.validate(&config), Err(ConfigError::Validation(_))));

    let mut config = AppConfig::default();
    config.api.ws_url = Some("http://example.com/ws".to_string());
    assert!(matches!(manager.validate(&config), Err(ConfigError::Validation(_))));

    let mut config = AppConfig::default();
    config.chat.history_max = 0;
    assert!(matches!(manager.validate(&config), Err(ConfigError::Validation(_))));

    let mut config = AppConfig::default();
    config.log_level = "loud".to_string();
    assert!(matches!(manager.validate(&config), Err(ConfigError::Validation(_))));
}
