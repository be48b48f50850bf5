//! RAG collections

use ragdesk_common::auth::string_or_number;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::{segment, ApiClient};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub document_count: u32,
}

#[derive(Debug, Serialize)]
struct NewCollection<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CollectionListing {
    Bare(Vec<Collection>),
    Wrapped { collections: Vec<Collection> },
}

impl ApiClient {
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(match self.get_json::<CollectionListing>("/api/rag/collections").await? {
            CollectionListing::Bare(items) | CollectionListing::Wrapped { collections: items } => items,
        })
    }

    pub async fn create_collection(&self, name: &str, description: Option<&str>) -> Result<Collection> {
        self.send_json(
            Method::POST,
            "/api/rag/collections",
            &NewCollection { name, description },
        )
        .await
    }

    pub async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/api/rag/collections/{}", segment(collection_id)),
        )
        .await
    }
}
