//! Sessions command - list, inspect, rename and delete chat sessions

use chrono::Local;
use ragdesk_sessions::{Message, SessionSummary};

use crate::commands::Command;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::{truncate, OutputStyle};

/// Sessions command action
#[derive(Debug, Clone)]
pub enum SessionsAction {
    /// List all sessions
    List,
    /// Print a session's transcript
    Show { id: String },
    /// Rename a session
    Rename { id: String, title: String },
    /// Delete a session
    Delete { id: String },
}

/// Sessions command handler
pub struct SessionsCommand {
    ctx: AppContext,
    action: SessionsAction,
}

impl SessionsCommand {
    pub fn new(ctx: AppContext, action: SessionsAction) -> Self {
        Self { ctx, action }
    }
}

#[async_trait::async_trait]
impl Command for SessionsCommand {
    async fn execute(&self) -> CliResult<()> {
        let store = self.ctx.chat_store();
        let style = &self.ctx.style;
        let sessions = store.load_sessions().await?;

        match &self.action {
            SessionsAction::List => {
                for line in render_session_list(style, &sessions, None) {
                    println!("{}", line);
                }
            }
            SessionsAction::Show { id } => {
                let messages = store.load_session(id).await?;
                let title = sessions
                    .iter()
                    .find(|s| &s.session_id == id)
                    .map(|s| s.display_title().to_string())
                    .unwrap_or_else(|| id.clone());
                println!("{}", style.section(&title));
                for line in render_transcript(style, &messages) {
                    println!("{}", line);
                }
            }
            SessionsAction::Rename { id, title } => {
                store.update_session_title(id, title).await?;
                println!("{}", style.success(&format!("Renamed {} to '{}'", id, title.trim())));
            }
            SessionsAction::Delete { id } => {
                store.delete_session(id).await?;
                println!("{}", style.success(&format!("Deleted session {}", id)));
            }
        }
        Ok(())
    }
}

/// One line per session, most recent first; `current` is marked
pub fn render_session_list(
    style: &OutputStyle,
    sessions: &[SessionSummary],
    current: Option<&str>,
) -> Vec<String> {
    if sessions.is_empty() {
        return vec![style.info("No sessions yet. Start one with 'ragdesk chat'.")];
    }
    let mut lines = vec![style.header(&format!("Sessions ({})", sessions.len()))];
    for session in sessions {
        let marker = if current == Some(session.session_id.as_str()) {
            "*"
        } else {
            " "
        };
        let updated = session
            .updated_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M");
        lines.push(format!(
            "{} {}  {}  {} ({} messages)",
            marker,
            session.session_id,
            style.dimmed(&updated.to_string()),
            truncate(session.display_title(), 40),
            session.message_count
        ));
    }
    lines
}

/// Speaker-labelled transcript lines
pub fn render_transcript(style: &OutputStyle, messages: &[Message]) -> Vec<String> {
    if messages.is_empty() {
        return vec![style.dimmed("(no messages)")];
    }
    let mut lines = Vec::new();
    for message in messages {
        lines.push(format!("{} {}", style.speaker(&message.role.to_string()), message.content));
        if let Some(tools) = message.tools_used.as_ref().filter(|t| !t.is_empty()) {
            lines.push(style.dimmed(&format!("  tools: {}", tools.join(", "))));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_list_marks_current() {
        let style = OutputStyle::plain();
        let mut first = SessionSummary::new("s-1");
        first.title = Some("Quarterly numbers".to_string());
        first.message_count = 4;
        let second = SessionSummary::new("s-2");

        let lines = render_session_list(&style, &[first, second], Some("s-2"));
        assert_eq!(lines[0], "Sessions (2)");
        assert!(lines[1].starts_with("  s-1"));
        assert!(lines[1].ends_with("Quarterly numbers (4 messages)"));
        assert!(lines[2].starts_with("* s-2"));
        assert!(lines[2].contains("New chat"));
    }

    #[test]
    fn test_empty_session_list() {
        let lines = render_session_list(&OutputStyle::plain(), &[], None);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("No sessions yet"));
    }

    #[test]
    fn test_transcript_lists_tools() {
        let mut answer = Message::assistant("It is 42.");
        answer.tools_used = Some(vec!["search".to_string(), "calc".to_string()]);
        let lines = render_transcript(&OutputStyle::plain(), &[Message::user("Answer?"), answer]);
        assert_eq!(
            lines,
            vec![
                "user: Answer?".to_string(),
                "assistant: It is 42.".to_string(),
                "  tools: search, calc".to_string(),
            ]
        );
    }
}
