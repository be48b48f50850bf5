//! Sending messages through the chat stream

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use ragdesk_api::{
    ApiError, ChatStreamRequest, ChatTransport, StreamCallbacks, StreamChunk, StreamHandle,
    StreamReader, StreamSummary,
};

use crate::error::SessionResult;
use crate::store::{ChatStore, StreamOutcome, StreamTag};

/// Request options applied to every message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    pub mode: String,
    pub use_react: bool,
    /// Restrict retrieval to one RAG collection
    pub collection_id: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            mode: "chat".to_string(),
            use_react: false,
            collection_id: None,
        }
    }
}

/// Glues the store to the stream reader
pub struct ChatController {
    store: Arc<ChatStore>,
    transport: Arc<dyn ChatTransport>,
    options: RwLock<ChatOptions>,
}

impl ChatController {
    pub fn new(store: Arc<ChatStore>, transport: Arc<dyn ChatTransport>, options: ChatOptions) -> Self {
        Self {
            store,
            transport,
            options: RwLock::new(options),
        }
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    pub fn options(&self) -> ChatOptions {
        self.options.read().clone()
    }

    pub fn set_options(&self, options: ChatOptions) {
        *self.options.write() = options;
    }

    pub fn set_collection(&self, collection_id: Option<String>) {
        self.options.write().collection_id = collection_id;
    }

    /// Send a message in the current session and start streaming the reply
    ///
    /// Rejected with [`crate::SessionError::StreamInFlight`] while a reply is
    /// still streaming.
    pub fn send_message(&self, text: &str) -> SessionResult<StreamHandle> {
        let tag = self.store.begin_stream(text)?;
        let options = self.options();

        let mut request = ChatStreamRequest::new(text.trim(), tag.session_id.clone(), options.mode);
        request.collection_id = options.collection_id;
        if options.use_react {
            request.use_react = Some(true);
        }

        let callbacks = Arc::new(StoreCallbacks {
            store: Arc::downgrade(&self.store),
            tag: tag.clone(),
        });
        let handle = StreamReader::open(self.transport.clone(), request, callbacks);
        self.store.attach_stream(&tag, handle.clone());
        Ok(handle)
    }

    /// Stop the streaming reply; returns whether one was running
    pub fn stop(&self) -> bool {
        self.store.cancel_stream()
    }
}

struct StoreCallbacks {
    store: Weak<ChatStore>,
    tag: StreamTag,
}

impl StoreCallbacks {
    fn finish(&self, summary: StreamSummary, outcome: StreamOutcome) {
        if let Some(store) = self.store.upgrade() {
            store.finish_stream(&self.tag, summary, outcome);
        }
    }
}

impl StreamCallbacks for StoreCallbacks {
    fn on_chunk(&self, chunk: &StreamChunk) {
        if let Some(store) = self.store.upgrade() {
            store.apply_chunk(&self.tag, chunk);
        }
    }

    fn on_error(&self, error: ApiError, summary: StreamSummary) {
        self.finish(summary, StreamOutcome::Failed(error));
    }

    fn on_done(&self, summary: StreamSummary) {
        self.finish(summary, StreamOutcome::Completed);
    }

    fn on_cancel(&self, summary: StreamSummary) {
        self.finish(summary, StreamOutcome::Cancelled);
    }
}
