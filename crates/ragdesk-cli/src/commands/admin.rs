//! Admin command - user management, stats, activity and impersonation

use chrono::Local;
use ragdesk_api::{ActivityPage, AdminUser, ApiError, SystemStats};

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

#[derive(Debug, Clone)]
pub enum AdminAction {
    Users,
    Block { user_id: String },
    Unblock { user_id: String },
    Promote { user_id: String },
    Stats,
    Activity { page: u32, limit: u32 },
    Impersonate { user_id: String },
    StopImpersonating,
}

pub struct AdminCommand {
    ctx: AppContext,
    action: AdminAction,
}

impl AdminCommand {
    pub fn new(ctx: AppContext, action: AdminAction) -> Self {
        Self { ctx, action }
    }

    fn require_admin(&self) -> CliResult<()> {
        let session = self.ctx.require_login()?;
        if session.user.role.is_admin() {
            Ok(())
        } else {
            Err(CliError::Api(ApiError::Permission(
                "Admin access required".to_string(),
            )))
        }
    }
}

#[async_trait::async_trait]
impl Command for AdminCommand {
    async fn execute(&self) -> CliResult<()> {
        let client = &self.ctx.client;
        let style = &self.ctx.style;

        if let AdminAction::StopImpersonating = self.action {
            let admin = client.stop_impersonation()?;
            self.ctx.persist_auth()?;
            println!("{}", style.success(&format!("Back to {}", admin.user.email)));
            return Ok(());
        }
        self.require_admin()?;

        match &self.action {
            AdminAction::Users => {
                let users = client.list_users().await?;
                for line in render_users(style, &users) {
                    println!("{}", line);
                }
            }
            AdminAction::Block { user_id } => {
                client.block_user(user_id).await?;
                println!("{}", style.success(&format!("Blocked user {}", user_id)));
            }
            AdminAction::Unblock { user_id } => {
                client.unblock_user(user_id).await?;
                println!("{}", style.success(&format!("Unblocked user {}", user_id)));
            }
            AdminAction::Promote { user_id } => {
                client.promote_user(user_id).await?;
                println!("{}", style.success(&format!("Promoted user {} to admin", user_id)));
            }
            AdminAction::Stats => {
                let stats = client.system_stats().await?;
                for line in render_stats(style, &stats) {
                    println!("{}", line);
                }
            }
            AdminAction::Activity { page, limit } => {
                let activity = client.activity_log(*page, *limit).await?;
                for line in render_activity(style, &activity) {
                    println!("{}", line);
                }
            }
            AdminAction::Impersonate { user_id } => {
                let session = client.start_impersonation(user_id).await?;
                self.ctx.persist_auth()?;
                println!(
                    "{}",
                    style.warning(&format!(
                        "Now acting as {}. Run 'ragdesk admin stop-impersonating' to return.",
                        session.user.email
                    ))
                );
            }
            AdminAction::StopImpersonating => {}
        }
        Ok(())
    }
}

pub fn render_users(style: &OutputStyle, users: &[AdminUser]) -> Vec<String> {
    let mut lines = vec![style.header(&format!("Users ({})", users.len()))];
    for user in users {
        let blocked = if user.is_blocked { " [blocked]" } else { "" };
        lines.push(format!(
            "  {:<8} {:<32} {:<10}{}",
            user.id,
            user.email,
            user.role.to_string(),
            blocked
        ));
    }
    lines
}

pub fn render_stats(style: &OutputStyle, stats: &SystemStats) -> Vec<String> {
    vec![
        style.section("System"),
        style.key_value("Users", &format!("{} ({} active)", stats.total_users, stats.active_users)),
        style.key_value("Sessions", &stats.total_sessions.to_string()),
        style.key_value("Messages", &stats.total_messages.to_string()),
        style.key_value("Documents", &stats.total_documents.to_string()),
    ]
}

pub fn render_activity(style: &OutputStyle, page: &ActivityPage) -> Vec<String> {
    let mut lines = vec![style.header(&format!(
        "Activity (page {}, {} total)",
        page.page, page.total
    ))];
    for entry in &page.items {
        let when = entry
            .timestamp
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let who = entry.user_email.as_deref().unwrap_or("system");
        let mut line = format!("  {}  {:<28} {}", style.dimmed(&when), who, entry.action);
        if let Some(details) = &entry.details {
            line.push_str(&format!(" ({})", details));
        }
        lines.push(line);
    }
    if page.has_more() {
        lines.push(style.tip(&format!(
            "More entries: ragdesk admin activity --page {}",
            page.page + 1
        )));
    }
    lines
}
