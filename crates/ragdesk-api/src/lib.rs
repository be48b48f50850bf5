//! ragdesk backend client
//!
//! Typed access to the chat backend: authentication, the streaming chat
//! endpoint, session resources, RAG documents and collections, the admin
//! dashboard and usage monitoring. Errors carry an [`ErrorClass`] so
//! front-ends can decide what to show through [`notification_for`].
//!
//! ```ignore
//! let client = Arc::new(ApiClient::new(ClientConfig::new("http://localhost:8000"), AuthState::new())?);
//! client.login("ada@example.com", "secret").await?;
//! let handle = StreamReader::open(client.clone(), ChatStreamRequest::new("Hello", "s1", "chat"), callbacks);
//! ```

pub mod admin;
pub mod auth;
pub mod client;
pub mod collections;
pub mod config;
pub mod documents;
pub mod error;
pub mod monitoring;
pub mod notify;
pub mod retry;
pub mod sessions;
pub mod stream;

pub use admin::{ActivityEntry, ActivityPage, AdminUser, SystemStats};
pub use auth::{clear_session, restore_session, save_session, TokenResponse};
pub use client::{ApiClient, GUEST_EMAIL_HEADER};
pub use collections::Collection;
pub use config::ClientConfig;
pub use documents::{Document, DocumentStatus, Review};
pub use error::{ApiError, ErrorClass, Result};
pub use monitoring::{UsageToday, UserUsage};
pub use notify::{is_impersonation_noise, notification_for, Notification, NotificationLevel};
pub use retry::{RetryConfig, RetryMiddleware};
pub use sessions::RemoteSession;
pub use stream::{
    decode_unit, ChatStreamRequest, ChatTransport, DecodedUnit, LineStream, StreamCallbacks,
    StreamChunk, StreamHandle, StreamReader, StreamSummary,
};
