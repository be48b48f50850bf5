//! Server-side chat session resources
//!
//! Message payloads are generic so the session crate can keep its own
//! message model; this module only knows the resource shapes.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::client::{segment, ApiClient};
use crate::error::Result;

/// Session as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Endpoints answer either with a bare list or wrapped in an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Sessions { sessions: Vec<T> },
    Messages { messages: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Sessions { sessions: items } => items,
            Listing::Messages { messages } => messages,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateSession<'a> {
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Rename<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct ReplaceMessages<'a, M> {
    messages: &'a [M],
}

impl ApiClient {
    pub async fn list_sessions(&self) -> Result<Vec<RemoteSession>> {
        let listing: Listing<RemoteSession> = self.get_json("/api/sessions").await?;
        Ok(listing.into_vec())
    }

    /// Register a session the client created locally
    pub async fn create_session(&self, session_id: &str, title: Option<&str>) -> Result<RemoteSession> {
        self.send_json(
            Method::POST,
            "/api/sessions",
            &CreateSession { session_id, title },
        )
        .await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/api/sessions/{}", segment(session_id)))
            .await
    }

    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send_json(
                Method::PATCH,
                &format!("/api/sessions/{}", segment(session_id)),
                &Rename { title },
            )
            .await?;
        Ok(())
    }

    pub async fn get_session_messages<M: DeserializeOwned>(&self, session_id: &str) -> Result<Vec<M>> {
        let listing: Listing<M> = self
            .get_json(&format!("/api/sessions/{}/messages", segment(session_id)))
            .await?;
        Ok(listing.into_vec())
    }

    /// Replace the stored message list of a session
    pub async fn put_session_messages<M: Serialize + Sync>(
        &self,
        session_id: &str,
        messages: &[M],
    ) -> Result<()> {
        let _: serde_json::Value = self
            .send_json(
                Method::PUT,
                &format!("/api/sessions/{}/messages", segment(session_id)),
                &ReplaceMessages { messages },
            )
            .await?;
        Ok(())
    }
}
