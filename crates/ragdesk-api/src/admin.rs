//! Admin dashboard endpoints
//!
//! Most of these require an admin token; some (promotion, impersonation) are
//! superadmin-only and surface [`ApiError::Permission`] otherwise.

use chrono::{DateTime, Utc};
use ragdesk_common::auth::{optional_string_or_number, string_or_number};
use ragdesk_common::{AuthSession, UserRole};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::TokenResponse;
use crate::client::{segment, ApiClient};
use crate::error::{ApiError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemStats {
    pub total_users: u64,
    pub active_users: u64,
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_documents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One page of the activity log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityPage {
    #[serde(default, alias = "activities")]
    pub items: Vec<ActivityEntry>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

impl ActivityPage {
    pub fn has_more(&self) -> bool {
        (self.page as u64) * (self.limit as u64) < self.total
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserListing {
    Bare(Vec<AdminUser>),
    Wrapped { users: Vec<AdminUser> },
}

impl ApiClient {
    pub async fn list_users(&self) -> Result<Vec<AdminUser>> {
        Ok(match self.get_json::<UserListing>("/api/admin/users").await? {
            UserListing::Bare(users) | UserListing::Wrapped { users } => users,
        })
    }

    pub async fn block_user(&self, user_id: &str) -> Result<()> {
        self.user_action(user_id, "block").await
    }

    pub async fn unblock_user(&self, user_id: &str) -> Result<()> {
        self.user_action(user_id, "unblock").await
    }

    /// Grant the admin role (superadmin only)
    pub async fn promote_user(&self, user_id: &str) -> Result<()> {
        self.user_action(user_id, "promote").await
    }

    async fn user_action(&self, user_id: &str, action: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send_for(
                Method::POST,
                &format!("/api/admin/users/{}/{}", segment(user_id), action),
            )
            .await?;
        info!("Admin action '{}' applied to user {}", action, user_id);
        Ok(())
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        self.get_json("/api/admin/stats").await
    }

    /// Activity log, 1-based pages
    pub async fn activity_log(&self, page: u32, limit: u32) -> Result<ActivityPage> {
        let page = page.max(1);
        let mut result: ActivityPage = self
            .get_json(&format!("/api/admin/activity?page={}&limit={}", page, limit))
            .await?;
        if result.page == 0 {
            result.page = page;
        }
        if result.limit == 0 {
            result.limit = limit;
        }
        Ok(result)
    }

    /// Act as another user; the admin session is kept for [`Self::stop_impersonation`]
    pub async fn start_impersonation(&self, user_id: &str) -> Result<AuthSession> {
        let admin = self.auth().current().ok_or(ApiError::Unauthorized)?;
        let response: TokenResponse = self
            .send_for(
                Method::POST,
                &format!("/api/admin/impersonate/{}", segment(user_id)),
            )
            .await?;

        {
            let mut origin = self.impersonation_origin.lock();
            if origin.is_none() {
                *origin = Some(admin);
            }
        }

        let email = response.user.email.clone();
        let mut session = AuthSession::new(response.access_token, response.user);
        session.impersonating = Some(email.clone());
        self.auth().login(session.clone());
        info!("Impersonating {}", email);
        Ok(session)
    }

    /// Return to the admin session saved when impersonation started
    pub fn stop_impersonation(&self) -> Result<AuthSession> {
        let origin = self
            .impersonation_origin
            .lock()
            .take()
            .ok_or_else(|| ApiError::Validation("not impersonating anyone".to_string()))?;
        self.auth().login(origin.clone());
        info!("Stopped impersonation, back to {}", origin.user.email);
        Ok(origin)
    }

    pub fn is_impersonating(&self) -> bool {
        self.auth().is_impersonating()
    }

    /// Admin session that [`Self::stop_impersonation`] would return to
    pub fn impersonation_origin(&self) -> Option<AuthSession> {
        self.impersonation_origin.lock().clone()
    }

    /// Reinstate an admin session saved by an earlier process
    pub fn resume_impersonation(&self, origin: AuthSession) {
        *self.impersonation_origin.lock() = Some(origin);
    }
}
