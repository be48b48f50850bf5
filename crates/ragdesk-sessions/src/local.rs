//! Session persistence in client storage
//!
//! Layout: the session list lives under `sessions`, each session's messages
//! under `messages_<session_id>`.

use std::sync::Arc;

use parking_lot::Mutex;
use ragdesk_common::{ClientStorage, StorageResult};
use tracing::debug;

use crate::models::{sort_recent_first, Message, SessionSummary};

/// Key holding the session list
pub const SESSIONS_KEY: &str = "sessions";
const MESSAGES_PREFIX: &str = "messages_";

/// Storage key for a session's messages
///
/// ASCII letters, digits, `-` and `.` are kept; every other byte, `_`
/// included, becomes `_` plus two hex digits, so distinct ids never share a
/// key.
pub fn messages_key(session_id: &str) -> String {
    let mut key = String::with_capacity(MESSAGES_PREFIX.len() + session_id.len());
    key.push_str(MESSAGES_PREFIX);
    for byte in session_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.') {
            key.push(char::from(byte));
        } else {
            key.push_str(&format!("_{:02x}", byte));
        }
    }
    key
}

#[derive(Debug, Clone)]
pub struct LocalSessionStore {
    storage: ClientStorage,
    /// Serialises read-modify-write cycles on the session list
    list_lock: Arc<Mutex<()>>,
}

impl LocalSessionStore {
    pub fn new(storage: ClientStorage) -> Self {
        Self {
            storage,
            list_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn storage(&self) -> &ClientStorage {
        &self.storage
    }

    /// Session list, most recent first; a corrupt list reads as empty
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> =
            self.storage.get_lossy(SESSIONS_KEY).unwrap_or_default();
        sort_recent_first(&mut sessions);
        sessions
    }

    pub fn save_sessions(&self, sessions: &[SessionSummary]) -> StorageResult<()> {
        let _guard = self.list_lock.lock();
        self.storage.set(SESSIONS_KEY, sessions)
    }

    /// Insert or replace one entry in the list
    pub fn upsert_session(&self, summary: &SessionSummary) -> StorageResult<()> {
        let _guard = self.list_lock.lock();
        let mut sessions = self.list_sessions();
        match sessions
            .iter_mut()
            .find(|s| s.session_id == summary.session_id)
        {
            Some(existing) => *existing = summary.clone(),
            None => sessions.push(summary.clone()),
        }
        sort_recent_first(&mut sessions);
        self.storage.set(SESSIONS_KEY, &sessions)
    }

    /// Remove a session and its messages; returns whether anything existed
    pub fn remove_session(&self, session_id: &str) -> StorageResult<bool> {
        let listed = {
            let _guard = self.list_lock.lock();
            let mut sessions = self.list_sessions();
            let before = sessions.len();
            sessions.retain(|s| s.session_id != session_id);
            let listed = sessions.len() != before;
            if listed {
                self.storage.set(SESSIONS_KEY, &sessions)?;
            }
            listed
        };
        let had_messages = self.storage.remove(&messages_key(session_id))?;
        debug!(
            "Removed local session {} (listed: {}, messages: {})",
            session_id, listed, had_messages
        );
        Ok(listed || had_messages)
    }

    pub fn has_messages(&self, session_id: &str) -> bool {
        self.storage.contains(&messages_key(session_id))
    }

    pub fn load_messages(&self, session_id: &str) -> StorageResult<Option<Vec<Message>>> {
        self.storage.get(&messages_key(session_id))
    }

    pub fn save_messages(&self, session_id: &str, messages: &[Message]) -> StorageResult<()> {
        self.storage.set(&messages_key(session_id), messages)
    }
}
