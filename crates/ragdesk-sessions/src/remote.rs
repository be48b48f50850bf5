//! Server-side session persistence seam

use async_trait::async_trait;
use ragdesk_api::{ApiClient, Result};

use crate::models::{Message, SessionSummary};

/// Backend operations the chat store needs
#[async_trait]
pub trait RemoteSessions: Send + Sync {
    async fn list(&self) -> Result<Vec<SessionSummary>>;
    async fn create(&self, session_id: &str, title: Option<&str>) -> Result<()>;
    async fn delete(&self, session_id: &str) -> Result<()>;
    async fn rename(&self, session_id: &str, title: &str) -> Result<()>;
    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>>;
    async fn save_messages(&self, session_id: &str, messages: &[Message]) -> Result<()>;
}

#[async_trait]
impl RemoteSessions for ApiClient {
    async fn list(&self) -> Result<Vec<SessionSummary>> {
        Ok(self
            .list_sessions()
            .await?
            .into_iter()
            .map(SessionSummary::from)
            .collect())
    }

    async fn create(&self, session_id: &str, title: Option<&str>) -> Result<()> {
        self.create_session(session_id, title).await.map(|_| ())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.delete_session(session_id).await
    }

    async fn rename(&self, session_id: &str, title: &str) -> Result<()> {
        self.rename_session(session_id, title).await
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        self.get_session_messages(session_id).await
    }

    async fn save_messages(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        self.put_session_messages(session_id, messages).await
    }
}
