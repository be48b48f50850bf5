//! Event types published by the chat store

use serde::{Deserialize, Serialize};

/// Session lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionEvent {
    /// A fresh session became current
    Created { session_id: String },
    /// An existing session became current
    Switched { session_id: String },
    Renamed { session_id: String, title: String },
    Deleted { session_id: String },
    /// The session list was reloaded
    ListUpdated { count: usize },
}

/// Message list changes in the current session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageEvent {
    Added { session_id: String, index: usize },
    /// Content or tools of a message changed (streaming)
    Updated { session_id: String, index: usize },
    Removed { session_id: String, index: usize },
    /// Messages written to storage
    Saved { session_id: String, count: usize },
}

/// Chat stream lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamEvent {
    Started { session_id: String },
    Completed { session_id: String },
    Failed { session_id: String, error: String },
    Cancelled { session_id: String },
}
