//! RAG document management
//!
//! Status transitions are driven by the backend ingestion pipeline:
//! `pending → processing → {ready | needs_review | error}`. The only
//! transitions a client may request are approve/reject on a document that is
//! waiting for review.

use std::path::Path;

use ragdesk_common::auth::{optional_string_or_number, string_or_number};
use reqwest::{multipart, Method};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{segment, ApiClient};
use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    NeedsReview,
    Error,
}

impl DocumentStatus {
    /// Approve/reject are only valid while the document awaits review
    pub fn can_review(&self) -> bool {
        matches!(self, DocumentStatus::NeedsReview)
    }

    /// No further backend-driven transitions expected
    pub fn is_settled(&self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Error)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::NeedsReview => "needs_review",
            DocumentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub chunk_count: u32,
    pub status: DocumentStatus,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub collection_id: Option<String>,
}

/// Decision on a document awaiting review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Review {
    Approve,
    Reject,
}

impl Review {
    fn action(&self) -> &'static str {
        match self {
            Review::Approve => "approve",
            Review::Reject => "reject",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentListing {
    Bare(Vec<Document>),
    Wrapped { documents: Vec<Document> },
}

impl ApiClient {
    pub async fn list_documents(&self, collection_id: Option<&str>) -> Result<Vec<Document>> {
        let path = match collection_id {
            Some(id) => format!("/api/rag/documents?collection_id={}", segment(id)),
            None => "/api/rag/documents".to_string(),
        };
        Ok(match self.get_json::<DocumentListing>(&path).await? {
            DocumentListing::Bare(docs) | DocumentListing::Wrapped { documents: docs } => docs,
        })
    }

    /// Upload file contents for ingestion
    pub async fn upload_document(
        &self,
        filename: &str,
        contents: Vec<u8>,
        collection_id: Option<&str>,
    ) -> Result<Document> {
        let size = contents.len();
        let part = multipart::Part::bytes(contents).file_name(filename.to_string());
        let mut form = multipart::Form::new().part("file", part);
        if let Some(id) = collection_id {
            form = form.text("collection_id", id.to_string());
        }

        let request = self
            .stream_request(Method::POST, "/api/rag/documents")?
            .multipart(form);
        let response = ApiClient::send(request).await?;
        let document: Document = response.json().await?;
        info!("Uploaded {} ({} bytes) as document {}", filename, size, document.id);
        Ok(document)
    }

    /// Upload a file from disk
    pub async fn upload_document_file(
        &self,
        path: &Path,
        collection_id: Option<&str>,
    ) -> Result<Document> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::Validation(format!("not a file: {}", path.display())))?
            .to_string();
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Validation(format!("cannot read {}: {}", path.display(), e)))?;
        self.upload_document(&filename, contents, collection_id).await
    }

    /// Request a review transition, rejecting it locally when the status does not allow one
    pub async fn review_document(&self, document: &Document, review: Review) -> Result<()> {
        if !document.status.can_review() {
            return Err(ApiError::Validation(format!(
                "document {} is {} and cannot be reviewed",
                document.filename, document.status
            )));
        }
        self.review_document_id(&document.id, review).await
    }

    /// Request a review transition by id; the backend validates the status
    pub async fn review_document_id(&self, document_id: &str, review: Review) -> Result<()> {
        let _: serde_json::Value = self
            .send_for(
                Method::POST,
                &format!("/api/rag/documents/{}/{}", segment(document_id), review.action()),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/api/rag/documents/{}", segment(document_id)),
        )
        .await
    }
}
