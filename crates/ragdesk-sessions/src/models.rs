//! Session and message models

use chrono::{DateTime, Utc};
use ragdesk_api::RemoteSession;
use serde::{Deserialize, Serialize};

/// Longest automatically derived title
pub const TITLE_MAX_CHARS: usize = 50;

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tools_used: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Empty assistant message awaiting streamed content
    pub fn placeholder() -> Self {
        Self::assistant(String::new())
    }

    pub fn is_placeholder(&self) -> bool {
        self.role == MessageRole::Assistant && self.content.is_empty()
    }
}

/// Entry in the session list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            title: None,
            message_count: 0,
            summary: None,
            updated_at: Utc::now(),
        }
    }

    /// Title for display, falling back to a generic label
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("New chat")
    }
}

impl From<RemoteSession> for SessionSummary {
    fn from(remote: RemoteSession) -> Self {
        Self {
            session_id: remote.session_id,
            title: remote.title,
            message_count: remote.message_count,
            summary: remote.summary,
            updated_at: remote.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Fresh opaque session id
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Title derived from the first user message
pub fn derive_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut title: String = line.chars().take(TITLE_MAX_CHARS).collect();
    if line.chars().count() > TITLE_MAX_CHARS {
        title = title.trim_end().to_string();
        title.push('…');
    }
    Some(title)
}

/// Sort most recently updated first
pub fn sort_recent_first(sessions: &mut [SessionSummary]) {
    sessions.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_message_serialization_shape() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));

        let msg: Message = serde_json::from_str(
            r#"{"role": "assistant", "content": "done", "tools_used": ["search"]}"#,
        )
        .unwrap();
        assert_eq!(msg.tools_used, Some(vec!["search".to_string()]));
    }

    #[test]
    fn test_placeholder() {
        assert!(Message::placeholder().is_placeholder());
        assert!(!Message::user("").is_placeholder());
        assert!(!Message::assistant("x").is_placeholder());
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("  \n Hello there\nsecond"), Some("Hello there".into()));
        assert_eq!(derive_title("   "), None);
        let long = "a".repeat(80);
        let title = derive_title(&long).unwrap();
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_sort_recent_first() {
        let now = Utc::now();
        let mut sessions = vec![
            SessionSummary {
                updated_at: now - Duration::minutes(5),
                ..SessionSummary::new("old")
            },
            SessionSummary {
                updated_at: now,
                ..SessionSummary::new("new")
            },
        ];
        sort_recent_first(&mut sessions);
        assert_eq!(sessions[0].session_id, "new");
    }
}
