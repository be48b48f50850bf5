//! Authentication state shared across the client
//!
//! [`AuthState`] is a cheap-to-clone handle over a `tokio::sync::watch`
//! channel. Components that gate their behaviour on login (the health
//! monitor, remote session persistence) subscribe and react to changes.

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::watch;
use tracing::info;

/// Role of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Superadmin,
}

impl UserRole {
    /// Admin dashboard access (admins and superadmins)
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Superadmin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Admin => write!(f, "admin"),
            UserRole::Superadmin => write!(f, "superadmin"),
        }
    }
}

/// Accept identifiers the backend sends either as JSON numbers or strings
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

/// Optional variant of [`string_or_number`]; use with `#[serde(default)]`
pub fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "string_or_number")] String);

    Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(s)| s))
}

/// Profile of the logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

/// An authenticated session: bearer token plus who it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: UserInfo,
    /// Email of the user an admin is currently impersonating
    #[serde(default)]
    pub impersonating: Option<String>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, user: UserInfo) -> Self {
        Self {
            token: token.into(),
            user,
            impersonating: None,
        }
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonating.is_some()
    }
}

/// Broadcast handle for the current authentication state
#[derive(Debug, Clone)]
pub struct AuthState {
    tx: watch::Sender<Option<AuthSession>>,
}

impl AuthState {
    /// Start logged out
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Start with an already restored session
    pub fn with_session(session: AuthSession) -> Self {
        let (tx, _) = watch::channel(Some(session));
        Self { tx }
    }

    pub fn login(&self, session: AuthSession) {
        info!("Authenticated as {}", session.user.email);
        self.tx.send_replace(Some(session));
    }

    pub fn logout(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("Logged out");
        }
    }

    /// Mark (or clear) impersonation on the current session
    pub fn set_impersonating(&self, email: Option<String>) {
        self.tx.send_if_modified(|current| match current {
            Some(session) if session.impersonating != email => {
                session.impersonating = email.clone();
                true
            }
            _ => false,
        });
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn is_impersonating(&self) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .map(AuthSession::is_impersonating)
            .unwrap_or(false)
    }

    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn role(&self) -> Option<UserRole> {
        self.tx.borrow().as_ref().map(|s| s.user.role)
    }

    /// Receive every future change to the authentication state
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}
