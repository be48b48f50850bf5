//! Chat state container
//!
//! [`ChatStore`] owns the current session id, its message list, the session
//! list and the streaming flag. Every mutation happens under one lock, so
//! stream callbacks and user actions (switching or deleting a session while a
//! response streams in) never interleave halfway.
//!
//! Persistence:
//! - local storage always holds the session list and message cache
//! - authenticated users additionally get best-effort server persistence
//! - message writes are debounced; a burst of mutations becomes one write
//!
//! Sessions are lazy: [`ChatStore::create_new_session`] only allocates an
//! id. The session is recorded (locally and on the server) when its first
//! user message is added.
//!
//! Every in-flight stream carries a [`StreamTag`]. Chunks whose tag does not
//! match the active stream of the current session are discarded.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use ragdesk_api::{notification_for, ApiError, Notification, StreamChunk, StreamHandle, StreamSummary};
use ragdesk_common::{AuthState, Debouncer};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus, MessageEvent, SessionEvent, StreamEvent};
use crate::error::{SessionError, SessionResult};
use crate::local::LocalSessionStore;
use crate::models::{derive_title, new_session_id, sort_recent_first, Message, MessageRole, SessionSummary};
use crate::remote::RemoteSessions;

/// Default quiet period before messages are persisted
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub save_debounce: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
        }
    }
}

/// Identifies one stream: the session it writes into and its generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTag {
    pub session_id: String,
    pub generation: u64,
}

/// How a stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed,
    Failed(ApiError),
    Cancelled,
}

struct ActiveStream {
    tag: StreamTag,
    handle: Option<StreamHandle>,
}

struct StoreState {
    current: String,
    /// Whether the current session has been recorded in the session list
    materialized: bool,
    messages: Vec<Message>,
    sessions: Vec<SessionSummary>,
    active: Option<ActiveStream>,
    generation: u64,
}

impl StoreState {
    fn is_live(&self, tag: &StreamTag) -> bool {
        self.current == tag.session_id
            && self.active.as_ref().map_or(false, |a| a.tag == *tag)
    }
}

/// Explicit state container for chat sessions
pub struct ChatStore {
    state: Mutex<StoreState>,
    local: LocalSessionStore,
    remote: Option<Arc<dyn RemoteSessions>>,
    auth: AuthState,
    bus: EventBus,
    saver: Debouncer,
    this: Weak<ChatStore>,
}

impl ChatStore {
    /// Create a store with a fresh, not yet recorded session
    pub fn new(
        config: StoreConfig,
        local: LocalSessionStore,
        remote: Option<Arc<dyn RemoteSessions>>,
        auth: AuthState,
        bus: EventBus,
    ) -> Arc<Self> {
        let sessions = local.list_sessions();
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(StoreState {
                current: new_session_id(),
                materialized: false,
                messages: Vec::new(),
                sessions,
                active: None,
                generation: 0,
            }),
            local,
            remote,
            auth,
            bus,
            saver: Debouncer::new(config.save_debounce),
            this: this.clone(),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn current_session_id(&self) -> String {
        self.state.lock().current.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.state.lock().sessions.clone()
    }

    /// Whether a response is streaming into the current session
    pub fn is_streaming(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Whether the current session has been recorded yet
    pub fn is_materialized(&self) -> bool {
        self.state.lock().materialized
    }

    pub fn has_pending_save(&self) -> bool {
        self.saver.is_pending()
    }

    fn remote_if_authenticated(&self) -> Option<Arc<dyn RemoteSessions>> {
        if self.auth.is_authenticated() {
            self.remote.clone()
        } else {
            None
        }
    }

    fn notify_error(&self, err: &ApiError) {
        if let Some(notification) = notification_for(err, self.auth.is_impersonating()) {
            self.bus.notify(notification);
        }
    }

    /// Start a fresh session and make it current
    pub async fn create_new_session(&self) -> String {
        self.leave_current().await;
        let session_id = new_session_id();
        {
            let mut st = self.state.lock();
            st.current = session_id.clone();
            st.materialized = false;
            st.messages.clear();
        }
        debug!("Created session {}", session_id);
        self.bus.publish(BusEvent::Session(SessionEvent::Created {
            session_id: session_id.clone(),
        }));
        session_id
    }

    /// Switch to an existing session, loading its messages
    pub async fn set_current_session(&self, session_id: &str) -> SessionResult<()> {
        if self.current_session_id() == session_id {
            return Ok(());
        }
        let messages = self.load_session(session_id).await?;
        self.leave_current().await;
        {
            let mut st = self.state.lock();
            st.current = session_id.to_string();
            st.materialized = true;
            st.messages = messages;
        }
        info!("Switched to session {}", session_id);
        self.bus.publish(BusEvent::Session(SessionEvent::Switched {
            session_id: session_id.to_string(),
        }));
        Ok(())
    }

    /// Stop the stream and flush a pending save before the current session changes
    async fn leave_current(&self) {
        self.cancel_stream();
        if self.saver.cancel() {
            if let Err(e) = self.save_current_session_messages().await {
                warn!("Failed to save session before leaving it: {}", e);
            }
        }
    }

    /// Reload the session list, merging server sessions when authenticated
    pub async fn load_sessions(&self) -> SessionResult<Vec<SessionSummary>> {
        let mut sessions = self.local.list_sessions();

        if let Some(remote) = self.remote_if_authenticated() {
            match remote.list().await {
                Ok(remote_sessions) => {
                    for remote_session in remote_sessions {
                        match sessions
                            .iter_mut()
                            .find(|s| s.session_id == remote_session.session_id)
                        {
                            Some(existing) => {
                                let title = remote_session.title.clone().or(existing.title.take());
                                *existing = SessionSummary {
                                    title,
                                    ..remote_session
                                };
                            }
                            None => sessions.push(remote_session),
                        }
                    }
                    self.local.save_sessions(&sessions)?;
                }
                Err(e) => {
                    warn!("Failed to load sessions from server, using local cache: {}", e);
                    self.notify_error(&e);
                }
            }
        }

        sort_recent_first(&mut sessions);
        self.state.lock().sessions = sessions.clone();
        self.bus.publish(BusEvent::Session(SessionEvent::ListUpdated {
            count: sessions.len(),
        }));
        Ok(sessions)
    }

    /// Fetch a session's messages without making it current
    ///
    /// Server messages win when they are at least as complete as the local
    /// cache; a longer local copy holds writes the server has not seen yet.
    pub async fn load_session(&self, session_id: &str) -> SessionResult<Vec<Message>> {
        let local = match self.local.load_messages(session_id) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Ignoring unreadable local messages for {}: {}", session_id, e);
                None
            }
        };

        let mut remote_error = None;
        if let Some(remote) = self.remote_if_authenticated() {
            match remote.load_messages(session_id).await {
                Ok(messages) => {
                    let local_len = local.as_ref().map_or(0, Vec::len);
                    if messages.len() >= local_len {
                        self.local.save_messages(session_id, &messages)?;
                        return Ok(messages);
                    }
                    debug!("Local copy of {} is ahead of the server", session_id);
                }
                Err(e) => {
                    debug!("Server messages for {} unavailable: {}", session_id, e);
                    remote_error = Some(e);
                }
            }
        }

        if let Some(messages) = local {
            return Ok(messages);
        }
        let known = self
            .state
            .lock()
            .sessions
            .iter()
            .any(|s| s.session_id == session_id);
        match remote_error {
            _ if known => Ok(Vec::new()),
            Some(ApiError::NotFound(_)) | None => Err(SessionError::NotFound(session_id.to_string())),
            Some(e) => Err(e.into()),
        }
    }

    /// Record the current session in the list if this is its first user message
    fn materialize_locked(&self, st: &mut StoreState, first_text: &str) -> Option<SessionSummary> {
        if st.materialized {
            return None;
        }
        st.materialized = true;
        let mut summary = SessionSummary::new(st.current.clone());
        summary.title = derive_title(first_text);
        st.sessions.insert(0, summary.clone());
        Some(summary)
    }

    fn persist_new_session(&self, summary: SessionSummary) {
        if let Err(e) = self.local.upsert_session(&summary) {
            warn!("Failed to record session {} locally: {}", summary.session_id, e);
        }
        if let Some(remote) = self.remote_if_authenticated() {
            tokio::spawn(async move {
                if let Err(e) = remote
                    .create(&summary.session_id, summary.title.as_deref())
                    .await
                {
                    warn!("Failed to create session {} on server: {}", summary.session_id, e);
                }
            });
        }
    }

    /// Append a message to the current session
    pub fn add_message(&self, message: Message) -> usize {
        let (session_id, index, new_session) = {
            let mut st = self.state.lock();
            let new_session = if message.role == MessageRole::User {
                self.materialize_locked(&mut st, &message.content)
            } else {
                None
            };
            st.messages.push(message);
            (st.current.clone(), st.messages.len() - 1, new_session)
        };
        if let Some(summary) = new_session {
            self.persist_new_session(summary);
        }
        self.bus
            .publish(BusEvent::Message(MessageEvent::Added { session_id, index }));
        self.schedule_save();
        index
    }

    /// Append text to the last message if it is from the assistant
    pub fn update_last_message(&self, delta: &str) -> bool {
        self.mutate_last_assistant(|message| message.content.push_str(delta))
    }

    /// Replace the tool list of the last message if it is from the assistant
    pub fn update_last_message_tools(&self, tools: Vec<String>) -> bool {
        self.mutate_last_assistant(move |message| {
            message.tools_used = if tools.is_empty() { None } else { Some(tools) };
        })
    }

    fn mutate_last_assistant(&self, f: impl FnOnce(&mut Message)) -> bool {
        let (session_id, index) = {
            let mut st = self.state.lock();
            let index = match st.messages.len().checked_sub(1) {
                Some(i) if st.messages[i].role == MessageRole::Assistant => i,
                _ => return false,
            };
            f(&mut st.messages[index]);
            (st.current.clone(), index)
        };
        self.bus
            .publish(BusEvent::Message(MessageEvent::Updated { session_id, index }));
        self.schedule_save();
        true
    }

    /// Delete a session everywhere; deleting an unknown id is a no-op
    ///
    /// The server is asked first when authenticated, but its failure never
    /// blocks the local deletion. Deleting the current session moves to a
    /// fresh one.
    pub async fn delete_session(&self, session_id: &str) -> SessionResult<()> {
        // Detach the session before the first await: no stream chunk or
        // debounced save may touch it once deletion has started.
        let is_current = self.current_session_id() == session_id;
        if is_current {
            self.cancel_stream();
            self.saver.cancel();
        }
        let replacement = {
            let mut st = self.state.lock();
            st.sessions.retain(|s| s.session_id != session_id);
            if st.current == session_id {
                st.current = new_session_id();
                st.materialized = false;
                st.messages.clear();
                st.active = None;
                Some(st.current.clone())
            } else {
                None
            }
        };

        if let Some(remote) = self.remote_if_authenticated() {
            if let Err(e) = remote.delete(session_id).await {
                warn!(
                    "Server delete of session {} failed, deleting locally: {}",
                    session_id, e
                );
            }
        }

        let local_result = self.local.remove_session(session_id);
        info!("Deleted session {}", session_id);
        self.bus.publish(BusEvent::Session(SessionEvent::Deleted {
            session_id: session_id.to_string(),
        }));

        if let Some(new_id) = replacement {
            debug!("Created session {}", new_id);
            self.bus
                .publish(BusEvent::Session(SessionEvent::Created { session_id: new_id }));
        }
        local_result.map(|_| ()).map_err(SessionError::from)
    }

    /// Rename a recorded session
    pub async fn update_session_title(&self, session_id: &str, title: &str) -> SessionResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::Invalid("title cannot be empty".to_string()));
        }

        let summary = {
            let mut st = self.state.lock();
            let entry = st
                .sessions
                .iter_mut()
                .find(|s| s.session_id == session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            entry.title = Some(title.to_string());
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.local.upsert_session(&summary)?;

        if let Some(remote) = self.remote_if_authenticated() {
            if let Err(e) = remote.rename(session_id, title).await {
                warn!("Failed to rename session {} on server: {}", session_id, e);
                self.notify_error(&e);
            }
        }

        self.bus.publish(BusEvent::Session(SessionEvent::Renamed {
            session_id: session_id.to_string(),
            title: title.to_string(),
        }));
        Ok(())
    }

    /// Debounce a save of the current session's messages
    pub fn schedule_save(&self) {
        let this = self.this.clone();
        self.saver.schedule(async move {
            if let Some(store) = this.upgrade() {
                if let Err(e) = store.save_current_session_messages().await {
                    warn!("Debounced save failed: {}", e);
                }
            }
        });
    }

    /// Persist the current session's messages now
    ///
    /// An empty assistant placeholder of a running stream is never written.
    pub async fn save_current_session_messages(&self) -> SessionResult<()> {
        let (session_id, messages, summary) = {
            let mut st = self.state.lock();
            if !st.materialized {
                return Ok(());
            }
            let mut messages = st.messages.clone();
            if st.active.is_some() && messages.last().map_or(false, Message::is_placeholder) {
                messages.pop();
            }
            let current = st.current.clone();
            let summary = st
                .sessions
                .iter_mut()
                .find(|s| s.session_id == current)
                .map(|entry| {
                    entry.message_count = messages.len();
                    entry.updated_at = Utc::now();
                    entry.clone()
                });
            (current, messages, summary)
        };

        self.local.save_messages(&session_id, &messages)?;
        if let Some(summary) = summary {
            self.local.upsert_session(&summary)?;
        }
        debug!("Saved {} messages for {}", messages.len(), session_id);
        self.bus.publish(BusEvent::Message(MessageEvent::Saved {
            session_id: session_id.clone(),
            count: messages.len(),
        }));

        if let Some(remote) = self.remote_if_authenticated() {
            if let Err(e) = remote.save_messages(&session_id, &messages).await {
                warn!("Failed to sync session {} to server: {}", session_id, e);
            }
        }
        Ok(())
    }

    /// Push the user message and an assistant placeholder, opening a stream slot
    pub fn begin_stream(&self, text: &str) -> SessionResult<StreamTag> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::Invalid("message is empty".to_string()));
        }

        let (tag, first_index, new_session) = {
            let mut st = self.state.lock();
            if st.active.is_some() {
                return Err(SessionError::StreamInFlight);
            }
            st.generation += 1;
            let tag = StreamTag {
                session_id: st.current.clone(),
                generation: st.generation,
            };
            let new_session = self.materialize_locked(&mut st, text);
            st.messages.push(Message::user(text));
            st.messages.push(Message::placeholder());
            st.active = Some(ActiveStream {
                tag: tag.clone(),
                handle: None,
            });
            (tag, st.messages.len() - 2, new_session)
        };

        if let Some(summary) = new_session {
            self.persist_new_session(summary);
        }
        for index in [first_index, first_index + 1] {
            self.bus.publish(BusEvent::Message(MessageEvent::Added {
                session_id: tag.session_id.clone(),
                index,
            }));
        }
        self.bus.publish(BusEvent::Stream(StreamEvent::Started {
            session_id: tag.session_id.clone(),
        }));
        Ok(tag)
    }

    /// Remember the handle of the stream opened for `tag`
    pub fn attach_stream(&self, tag: &StreamTag, handle: StreamHandle) {
        let mut st = self.state.lock();
        match st.active.as_mut() {
            Some(active) if active.tag == *tag => active.handle = Some(handle),
            _ => debug!("Stream {:?} ended before its handle was attached", tag),
        }
    }

    /// Apply a chunk if its stream is still the live one
    pub fn apply_chunk(&self, tag: &StreamTag, chunk: &StreamChunk) -> bool {
        let Some(delta) = chunk.content() else {
            return false;
        };
        let index = {
            let mut st = self.state.lock();
            if !st.is_live(tag) {
                debug!("Discarding chunk for stale stream {:?}", tag);
                return false;
            }
            let Some(index) = st.messages.len().checked_sub(1) else {
                return false;
            };
            let last = &mut st.messages[index];
            if last.role != MessageRole::Assistant {
                return false;
            }
            last.content.push_str(delta);
            index
        };
        self.bus.publish(BusEvent::Message(MessageEvent::Updated {
            session_id: tag.session_id.clone(),
            index,
        }));
        true
    }

    /// Finalize the live stream
    ///
    /// Failure drops the streamed assistant message. Completion and
    /// cancellation drop it only when it is still empty, otherwise the tools
    /// seen during the stream are attached.
    pub fn finish_stream(&self, tag: &StreamTag, summary: StreamSummary, outcome: StreamOutcome) {
        let change = {
            let mut st = self.state.lock();
            if !st.is_live(tag) {
                debug!("Ignoring end of stale stream {:?}", tag);
                return;
            }
            st.active = None;

            let Some(index) = st.messages.len().checked_sub(1) else {
                return;
            };
            let (is_assistant, is_empty) = {
                let last = &st.messages[index];
                (last.role == MessageRole::Assistant, last.content.is_empty())
            };
            if !is_assistant {
                None
            } else if matches!(outcome, StreamOutcome::Failed(_)) || is_empty {
                st.messages.pop();
                Some(MessageEvent::Removed {
                    session_id: tag.session_id.clone(),
                    index,
                })
            } else if !summary.tools_used.is_empty() {
                st.messages[index].tools_used = Some(summary.tools_used.clone());
                Some(MessageEvent::Updated {
                    session_id: tag.session_id.clone(),
                    index,
                })
            } else {
                None
            }
        };

        if let Some(event) = change {
            self.bus.publish(BusEvent::Message(event));
        }

        let session_id = tag.session_id.clone();
        let event = match outcome {
            StreamOutcome::Completed => {
                debug!("Stream for {} completed ({} chunks)", session_id, summary.content_chunks);
                StreamEvent::Completed { session_id }
            }
            StreamOutcome::Cancelled => {
                info!("Stream for {} stopped", session_id);
                StreamEvent::Cancelled { session_id }
            }
            StreamOutcome::Failed(err) => {
                warn!("Stream for {} failed: {}", session_id, err);
                self.notify_error(&err);
                StreamEvent::Failed {
                    session_id,
                    error: err.to_string(),
                }
            }
        };
        self.bus.publish(BusEvent::Stream(event));
        self.schedule_save();
    }

    /// Cancel the in-flight stream, if any
    pub fn cancel_stream(&self) -> bool {
        let active = {
            let st = self.state.lock();
            st.active
                .as_ref()
                .map(|a| (a.tag.clone(), a.handle.clone()))
        };
        match active {
            None => false,
            Some((_, Some(handle))) => {
                handle.cancel();
                true
            }
            Some((tag, None)) => {
                self.finish_stream(&tag, StreamSummary::default(), StreamOutcome::Cancelled);
                true
            }
        }
    }

    /// Publish a user-facing notification
    pub fn notify(&self, notification: Notification) {
        self.bus.notify(notification);
    }

    /// React to login/logout: logout stops the stream, login reloads the list
    pub fn spawn_auth_watch(&self) -> JoinHandle<()> {
        let mut rx = self.auth.subscribe();
        let this = self.this.clone();
        tokio::spawn(async move {
            let mut was_authenticated = rx.borrow_and_update().is_some();
            while rx.changed().await.is_ok() {
                let authenticated = rx.borrow_and_update().is_some();
                let Some(store) = this.upgrade() else {
                    break;
                };
                if was_authenticated && !authenticated {
                    if store.cancel_stream() {
                        info!("Logged out, chat stream stopped");
                    }
                } else if !was_authenticated && authenticated {
                    if let Err(e) = store.load_sessions().await {
                        warn!("Failed to reload sessions after login: {}", e);
                    }
                }
                was_authenticated = authenticated;
            }
        })
    }
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("ChatStore")
            .field("current", &st.current)
            .field("messages", &st.messages.len())
            .field("sessions", &st.sessions.len())
            .field("streaming", &st.active.is_some())
            .finish()
    }
}
