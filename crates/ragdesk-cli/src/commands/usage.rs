//! Usage command - today's usage counters

use ragdesk_api::UsageToday;

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputStyle;

pub struct UsageCommand {
    ctx: AppContext,
    top: usize,
}

impl UsageCommand {
    pub fn new(ctx: AppContext, top: usize) -> Self {
        Self { ctx, top }
    }
}

#[async_trait::async_trait]
impl Command for UsageCommand {
    async fn execute(&self) -> CliResult<()> {
        self.ctx.require_login()?;
        let usage = self.ctx.client.usage_today().await?;
        for line in render_usage(&self.ctx.style, &usage, self.top) {
            println!("{}", line);
        }
        Ok(())
    }
}

pub fn render_usage(style: &OutputStyle, usage: &UsageToday, top: usize) -> Vec<String> {
    let title = match &usage.date {
        Some(date) => format!("Usage for {}", date),
        None => "Usage today".to_string(),
    };
    let mut lines = vec![
        style.section(&title),
        style.key_value("Requests", &usage.requests.to_string()),
        style.key_value("Tokens", &usage.tokens.to_string()),
    ];
    if let Some(cost) = usage.cost {
        lines.push(style.key_value("Cost", &format!("${:.2}", cost)));
    }
    let users = usage.top_users(top);
    if !users.is_empty() {
        lines.push(style.section("Top users"));
        for user in users {
            lines.push(style.list_item(&format!(
                "{} - {} tokens, {} requests",
                user.email, user.tokens, user.requests
            )));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdesk_api::UserUsage;

    #[test]
    fn test_render_usage() {
        let usage = UsageToday {
            date: Some("2024-05-01".to_string()),
            requests: 10,
            tokens: 1200,
            cost: Some(0.5),
            users: vec![
                UserUsage {
                    email: "a@x.io".to_string(),
                    requests: 3,
                    tokens: 200,
                },
                UserUsage {
                    email: "b@x.io".to_string(),
                    requests: 7,
                    tokens: 1000,
                },
            ],
        };
        let lines = render_usage(&OutputStyle::plain(), &usage, 1);
        assert!(lines[0].contains("Usage for 2024-05-01"));
        assert_eq!(lines[3], "  Cost: $0.50");
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[5], "  • b@x.io - 1000 tokens, 7 requests");
    }
}
