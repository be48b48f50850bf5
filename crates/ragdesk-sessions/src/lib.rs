//! ragdesk chat sessions
//!
//! The [`ChatStore`] state container holds the active session, its messages
//! and the streaming flag; [`ChatController`] sends messages through the
//! stream reader and feeds the reply back into the store. Front-ends observe
//! changes through the [`EventBus`].

pub mod bus;
pub mod chat;
pub mod error;
pub mod local;
pub mod models;
pub mod remote;
pub mod store;

pub use bus::{BusEvent, EventBus, MessageEvent, SessionEvent, StreamEvent};
pub use chat::{ChatController, ChatOptions};
pub use error::{SessionError, SessionResult};
pub use local::{messages_key, LocalSessionStore, SESSIONS_KEY};
pub use models::{Message, MessageRole, SessionSummary};
pub use remote::RemoteSessions;
pub use store::{ChatStore, StoreConfig, StreamOutcome, StreamTag, DEFAULT_SAVE_DEBOUNCE};
