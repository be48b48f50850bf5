//! Shared fixtures for the cross-crate tests under `tests/`
//!
//! A [`Desk`] wires the client crates together the way a front-end does:
//! one storage directory, one auth state, one API client that doubles as
//! chat transport and session backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ragdesk_api::{restore_session, save_session, ApiClient, ClientConfig};
use ragdesk_common::{AuthSession, AuthState, ClientStorage, UserInfo, UserRole};
use ragdesk_sessions::{
    ChatController, ChatOptions, ChatStore, EventBus, LocalSessionStore, StoreConfig,
};

/// Save debounce used by fixtures; short enough for real-time tests
pub const TEST_SAVE_DEBOUNCE: Duration = Duration::from_millis(50);

/// A fully wired client rooted at one storage directory
pub struct Desk {
    pub storage: ClientStorage,
    pub auth: AuthState,
    pub client: Arc<ApiClient>,
    pub controller: ChatController,
}

impl Desk {
    /// Open a client on `data_dir`, restoring a saved login if there is one
    pub fn open(data_dir: &Path, base_url: &str) -> Desk {
        let storage = ClientStorage::open(data_dir).expect("open storage");
        let auth = match restore_session(&storage) {
            Some(session) => AuthState::with_session(session),
            None => AuthState::new(),
        };
        let config = ClientConfig::new(base_url)
            .with_retry_count(0)
            .with_retry_delay(Duration::from_millis(10));
        let client = Arc::new(ApiClient::new(config, auth.clone()).expect("build client"));

        let store = ChatStore::new(
            StoreConfig {
                save_debounce: TEST_SAVE_DEBOUNCE,
            },
            LocalSessionStore::new(storage.clone()),
            Some(client.clone()),
            auth.clone(),
            EventBus::new(),
        );
        let controller = ChatController::new(store, client.clone(), ChatOptions::default());

        Desk {
            storage,
            auth,
            client,
            controller,
        }
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        self.controller.store()
    }

    /// Log in without a backend round trip and remember the login on disk
    pub fn sign_in(&self, token: &str, email: &str, role: UserRole) {
        let session = AuthSession::new(token, user(email, role));
        save_session(&self.storage, &session).expect("save session");
        self.auth.login(session);
    }
}

pub fn user(email: &str, role: UserRole) -> UserInfo {
    UserInfo {
        id: "1".to_string(),
        email: email.to_string(),
        name: None,
        role,
    }
}

/// Poll `condition` every few milliseconds for up to two seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}
