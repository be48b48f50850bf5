//! Login, registration and session persistence

use ragdesk_common::{AuthSession, ClientStorage, StorageResult, UserInfo};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::Result;

/// Storage key for the bearer token
pub const AUTH_TOKEN_KEY: &str = "auth_token";
/// Storage key for the cached user profile
pub const AUTH_USER_KEY: &str = "auth_user";

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

/// Body returned by login and register
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: UserInfo,
}

impl ApiClient {
    /// Exchange credentials for a token and mark the client authenticated
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let body = Credentials {
            email,
            password,
            name: None,
        };
        let response: TokenResponse = self
            .send_json(Method::POST, "/api/auth/login", &body)
            .await?;
        Ok(self.establish(response))
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<AuthSession> {
        let body = Credentials {
            email,
            password,
            name,
        };
        let response: TokenResponse = self
            .send_json(Method::POST, "/api/auth/register", &body)
            .await?;
        Ok(self.establish(response))
    }

    /// Profile of the current token's owner
    pub async fn me(&self) -> Result<UserInfo> {
        self.get_json("/api/auth/me").await
    }

    /// Drop credentials, including any saved impersonation origin
    pub fn logout(&self) {
        self.impersonation_origin.lock().take();
        self.auth().logout();
    }

    fn establish(&self, response: TokenResponse) -> AuthSession {
        let session = AuthSession::new(response.access_token, response.user);
        self.auth().login(session.clone());
        session
    }
}

/// Persist a session so the next run starts logged in
pub fn save_session(storage: &ClientStorage, session: &AuthSession) -> StorageResult<()> {
    storage.set(AUTH_TOKEN_KEY, &session.token)?;
    storage.set(AUTH_USER_KEY, &session.user)
}

/// Load a previously saved session, if both halves are present and readable
pub fn restore_session(storage: &ClientStorage) -> Option<AuthSession> {
    let token: String = storage.get_lossy(AUTH_TOKEN_KEY)?;
    let user: UserInfo = storage.get_lossy(AUTH_USER_KEY)?;
    info!("Restored session for {}", user.email);
    Some(AuthSession::new(token, user))
}

/// Remove persisted credentials
pub fn clear_session(storage: &ClientStorage) {
    for key in [AUTH_TOKEN_KEY, AUTH_USER_KEY] {
        if let Err(e) = storage.remove(key) {
            warn!("Failed to remove {}: {}", key, e);
        }
    }
}
