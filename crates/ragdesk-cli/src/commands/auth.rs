//! Login, registration and identity commands

use ragdesk_common::AuthSession;
use rustyline::DefaultEditor;
use tracing::warn;

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

/// Environment variable consulted when no password is given
pub const PASSWORD_ENV: &str = "RAGDESK_PASSWORD";

#[derive(Debug, Clone)]
pub enum AuthAction {
    Login {
        email: String,
        password: Option<String>,
    },
    Register {
        email: String,
        name: Option<String>,
        password: Option<String>,
    },
    Logout,
    Whoami,
}

pub struct AuthCommand {
    ctx: AppContext,
    action: AuthAction,
}

impl AuthCommand {
    pub fn new(ctx: AppContext, action: AuthAction) -> Self {
        Self { ctx, action }
    }

    fn password(given: &Option<String>) -> CliResult<String> {
        if let Some(password) = given {
            return Ok(password.clone());
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            return Ok(password);
        }
        let mut editor = DefaultEditor::new()?;
        let password = editor.readline("Password: ")?;
        if password.is_empty() {
            return Err(CliError::invalid("password cannot be empty"));
        }
        Ok(password)
    }

    fn finish_login(&self, session: &AuthSession, verb: &str) -> CliResult<()> {
        self.ctx.persist_auth()?;
        println!(
            "{}",
            self.ctx
                .style
                .success(&format!("{} as {} ({})", verb, session.user.email, session.user.role))
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl Command for AuthCommand {
    async fn execute(&self) -> CliResult<()> {
        let client = &self.ctx.client;
        let style = &self.ctx.style;

        match &self.action {
            AuthAction::Login { email, password } => {
                let password = Self::password(password)?;
                // A fresh login replaces any impersonation in progress
                client.logout();
                let session = client.login(email.trim(), &password).await?;
                self.finish_login(&session, "Logged in")
            }
            AuthAction::Register {
                email,
                name,
                password,
            } => {
                let password = Self::password(password)?;
                client.logout();
                let session = client
                    .register(email.trim(), &password, name.as_deref())
                    .await?;
                self.finish_login(&session, "Registered and logged in")
            }
            AuthAction::Logout => {
                let was_logged_in = self.ctx.auth.is_authenticated();
                client.logout();
                self.ctx.persist_auth()?;
                if was_logged_in {
                    println!("{}", style.success("Logged out"));
                } else {
                    println!("{}", style.info("Not logged in"));
                }
                Ok(())
            }
            AuthAction::Whoami => {
                let session = self.ctx.require_login()?;
                let verified = match client.me().await {
                    Ok(user) => Some(user),
                    Err(e) => {
                        warn!("Could not verify session with the server: {}", e);
                        None
                    }
                };
                for line in render_identity(style, &session, verified.is_some()) {
                    println!("{}", line);
                }
                Ok(())
            }
        }
    }
}

pub fn render_identity(style: &OutputStyle, session: &AuthSession, verified: bool) -> Vec<String> {
    let mut lines = vec![
        style.key_value("Email", &session.user.email),
        style.key_value("Role", &session.user.role.to_string()),
    ];
    if let Some(name) = &session.user.name {
        lines.insert(1, style.key_value("Name", name));
    }
    if let Some(target) = &session.impersonating {
        lines.push(style.warning(&format!("Impersonating {}", target)));
    }
    if !verified {
        lines.push(style.dimmed("(cached; server unreachable)"));
    }
    lines
}
