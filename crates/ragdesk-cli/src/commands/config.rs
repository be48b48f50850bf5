// Configuration management command

use ragdesk_config::{AppConfig, ConfigManager};

use crate::commands::Command;
use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

#[derive(Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init { force: bool },
}

pub struct ConfigCommand {
    manager: ConfigManager,
    action: ConfigAction,
    style: OutputStyle,
}

impl ConfigCommand {
    pub fn new(manager: ConfigManager, action: ConfigAction) -> Self {
        Self {
            manager,
            action,
            style: OutputStyle::default(),
        }
    }
}

#[async_trait::async_trait]
impl Command for ConfigCommand {
    async fn execute(&self) -> CliResult<()> {
        let path = self.manager.config_path();
        match &self.action {
            ConfigAction::Show => {
                let config = self.manager.load()?;
                let rendered = flatten_config(&config)?;
                println!("{}", self.style.dimmed(&format!("# {}", path.display())));
                print!("{}", rendered);
            }
            ConfigAction::Path => {
                println!("{}", path.display());
            }
            ConfigAction::Init { force } => {
                if path.exists() && !force {
                    return Err(CliError::invalid(format!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    )));
                }
                self.manager.save(&AppConfig::default())?;
                println!(
                    "{}",
                    self.style
                        .success(&format!("Wrote default configuration to {}", path.display()))
                );
            }
        }
        Ok(())
    }
}

fn flatten_config(config: &AppConfig) -> CliResult<String> {
    let value = serde_json::to_value(config).map_err(|e| CliError::Internal(e.to_string()))?;
    let mut lines = Vec::new();
    flatten("", &value, &mut lines);
    Ok(lines.join("\n") + "\n")
}

/// `section.key = value` lines for a JSON tree
fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        serde_json::Value::Null => out.push(format!("{} = (unset)", prefix)),
        other => out.push(format!("{} = {}", prefix, other)),
    }
}
