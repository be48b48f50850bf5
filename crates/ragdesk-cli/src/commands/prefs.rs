//! Preferences command

use ragdesk_common::{Preferences, Theme};

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

#[derive(Debug, Clone)]
pub enum PrefsAction {
    Show,
    Theme { theme: String },
    /// `None` clears the guest email
    GuestEmail { email: Option<String> },
    PersistentAccess { enabled: bool },
}

pub struct PrefsCommand {
    ctx: AppContext,
    action: PrefsAction,
}

impl PrefsCommand {
    pub fn new(ctx: AppContext, action: PrefsAction) -> Self {
        Self { ctx, action }
    }
}

#[async_trait::async_trait]
impl Command for PrefsCommand {
    async fn execute(&self) -> CliResult<()> {
        let prefs = &self.ctx.prefs;
        let style = &self.ctx.style;

        match &self.action {
            PrefsAction::Show => {
                for line in render_prefs(style, prefs) {
                    println!("{}", line);
                }
            }
            PrefsAction::Theme { theme } => {
                let theme: Theme = theme.parse().map_err(CliError::invalid)?;
                prefs.set_theme(theme)?;
                println!("{}", style.success(&format!("Theme set to {}", theme_name(theme))));
            }
            PrefsAction::GuestEmail { email } => {
                let email = email.as_deref().map(str::trim).filter(|e| !e.is_empty());
                if let Some(email) = email {
                    if !email.contains('@') {
                        return Err(CliError::invalid(format!("'{}' is not an email address", email)));
                    }
                }
                prefs.set_guest_email(email)?;
                match email {
                    Some(email) => println!("{}", style.success(&format!("Guest email set to {}", email))),
                    None => println!("{}", style.success("Guest email cleared")),
                }
            }
            PrefsAction::PersistentAccess { enabled } => {
                prefs.set_persistent_access(self.ctx.auth.role(), *enabled)?;
                let state = if *enabled { "enabled" } else { "disabled" };
                println!("{}", style.success(&format!("Persistent access {}", state)));
            }
        }
        Ok(())
    }
}

fn theme_name(theme: Theme) -> String {
    format!("{:?}", theme).to_lowercase()
}

pub fn render_prefs(style: &OutputStyle, prefs: &Preferences) -> Vec<String> {
    vec![
        style.section("Preferences"),
        style.key_value("Theme", &theme_name(prefs.theme())),
        style.key_value(
            "Guest email",
            prefs.guest_email().as_deref().unwrap_or("(none)"),
        ),
        style.key_value(
            "Persistent access",
            if prefs.persistent_access() { "on" } else { "off" },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdesk_common::ClientStorage;
    use tempfile::TempDir;

    #[test]
    fn test_render_prefs() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::new(ClientStorage::open(dir.path()).unwrap());
        prefs.set_theme(Theme::Dark).unwrap();
        prefs.set_guest_email(Some("guest@example.com")).unwrap();

        let lines = render_prefs(&OutputStyle::plain(), &prefs);
        assert_eq!(lines[1], "  Theme: dark");
        assert_eq!(lines[2], "  Guest email: guest@example.com");
        assert_eq!(lines[3], "  Persistent access: off");
    }
}
