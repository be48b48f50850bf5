//! Shared building blocks for the ragdesk client crates
//!
//! This crate holds the pieces every other ragdesk crate leans on: the
//! file-backed key/value store that plays the role of the client's local
//! storage, the authentication state broadcast, user preferences and the
//! cancellable debounce timer.

pub mod auth;
pub mod debounce;
pub mod error;
pub mod prefs;
pub mod storage;

pub use auth::{AuthSession, AuthState, UserInfo, UserRole};
pub use debounce::Debouncer;
pub use error::{StorageError, StorageResult};
pub use prefs::{Preferences, Theme};
pub use storage::ClientStorage;
