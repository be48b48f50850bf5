//! Persisted user preferences

use serde::{Deserialize, Serialize};

use crate::auth::UserRole;
use crate::error::{StorageError, StorageResult};
use crate::storage::ClientStorage;

const THEME_KEY: &str = "theme";
const GUEST_EMAIL_KEY: &str = "guest_email";
const PERSISTENT_ACCESS_KEY: &str = "persistent_access";

/// Colour theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}

/// Typed accessors for the preference keys in [`ClientStorage`]
#[derive(Debug, Clone)]
pub struct Preferences {
    storage: ClientStorage,
}

impl Preferences {
    pub fn new(storage: ClientStorage) -> Self {
        Self { storage }
    }

    pub fn theme(&self) -> Theme {
        self.storage.get_lossy(THEME_KEY).unwrap_or_default()
    }

    pub fn set_theme(&self, theme: Theme) -> StorageResult<()> {
        self.storage.set(THEME_KEY, &theme)
    }

    /// Email used to attribute usage for unauthenticated chats
    pub fn guest_email(&self) -> Option<String> {
        self.storage.get_lossy(GUEST_EMAIL_KEY)
    }

    pub fn set_guest_email(&self, email: Option<&str>) -> StorageResult<()> {
        match email {
            Some(email) => self.storage.set(GUEST_EMAIL_KEY, email),
            None => self.storage.remove(GUEST_EMAIL_KEY).map(|_| ()),
        }
    }

    pub fn persistent_access(&self) -> bool {
        self.storage.get_lossy(PERSISTENT_ACCESS_KEY).unwrap_or(false)
    }

    /// Toggle persistent access; only a superadmin may enable it
    pub fn set_persistent_access(&self, role: Option<UserRole>, enabled: bool) -> StorageResult<()> {
        if enabled && role != Some(UserRole::Superadmin) {
            return Err(StorageError::NotPermitted(
                "persistent access is reserved for superadmins".to_string(),
            ));
        }
        self.storage.set(PERSISTENT_ACCESS_KEY, &enabled)
    }
}
