//! Chat completion streaming
//!
//! The backend answers `POST /api/chat/stream` with an ordered sequence of
//! JSON units, either as server-sent events (`data: {...}`) or as
//! newline-delimited JSON. [`StreamReader`] decodes each unit into a
//! [`StreamChunk`] and drives a [`StreamCallbacks`] implementation:
//!
//! - chunks are dispatched strictly in arrival order
//! - a chunk carrying `error` ends the stream through `on_error`
//! - a chunk with `done` ends it through `on_done`, once
//! - [`StreamHandle::cancel`] ends it through `on_cancel` and never calls
//!   `on_done`
//!
//! Exactly one terminal callback fires per stream. Units that fail to decode
//! are skipped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::{header, Method};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::{ApiError, Result};

/// Streaming chat endpoint
pub const CHAT_STREAM_PATH: &str = "/api/chat/stream";

/// Payload sent to open a chat stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamRequest {
    pub message: String,
    pub session_id: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Ask the backend for step-by-step (ReAct) reasoning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_react: Option<bool>,
}

impl ChatStreamRequest {
    pub fn new(
        message: impl Into<String>,
        session_id: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            mode: mode.into(),
            collection_id: None,
            use_react: None,
        }
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn with_react(mut self, use_react: bool) -> Self {
        self.use_react = Some(use_react);
        self
    }
}

/// One decoded unit of a chat stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    /// Tool currently in use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            chunk: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Non-empty content carried by this chunk
    pub fn content(&self) -> Option<&str> {
        self.chunk.as_deref().filter(|c| !c.is_empty())
    }
}

/// What the reader saw by the time a stream ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Chunks that carried non-empty content
    pub content_chunks: usize,
    /// Final `tools_used` if the backend sent one, otherwise tools seen during the stream
    pub tools_used: Vec<String>,
}

#[derive(Debug, Default)]
struct SummaryTracker {
    content_chunks: usize,
    seen_tools: Vec<String>,
    final_tools: Option<Vec<String>>,
}

impl SummaryTracker {
    fn observe(&mut self, chunk: &StreamChunk) {
        if chunk.content().is_some() {
            self.content_chunks += 1;
        }
        if let Some(tool) = &chunk.tool {
            push_unique(&mut self.seen_tools, tool);
        }
        if let Some(tools) = &chunk.tools_used {
            if chunk.done {
                self.final_tools = Some(tools.clone());
            } else {
                for tool in tools {
                    push_unique(&mut self.seen_tools, tool);
                }
            }
        }
    }

    fn summary(&self) -> StreamSummary {
        StreamSummary {
            content_chunks: self.content_chunks,
            tools_used: self
                .final_tools
                .clone()
                .unwrap_or_else(|| self.seen_tools.clone()),
        }
    }
}

fn push_unique(list: &mut Vec<String>, tool: &str) {
    if !tool.is_empty() && !list.iter().any(|t| t == tool) {
        list.push(tool.to_string());
    }
}

/// Result of decoding one framed line
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedUnit {
    Chunk(StreamChunk),
    /// Framing noise: blank lines, SSE comments, `event:`/`id:` fields
    Ignored,
    /// Payload that is not a valid chunk
    Malformed(String),
}

/// Decode one line of the stream body
pub fn decode_unit(line: &str) -> DecodedUnit {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return DecodedUnit::Ignored;
    }

    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if is_sse_field(line) => return DecodedUnit::Ignored,
        None => line,
    };

    if payload.is_empty() {
        return DecodedUnit::Ignored;
    }
    if payload == "[DONE]" {
        return DecodedUnit::Chunk(StreamChunk::done());
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => DecodedUnit::Chunk(chunk),
        Err(e) => DecodedUnit::Malformed(e.to_string()),
    }
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

/// Splits a byte stream into lines, tolerating UTF-8 sequences split across reads
#[derive(Debug, Default)]
struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(rest)
    }
}

/// Stream of raw, undecoded lines
pub type LineStream = BoxStream<'static, Result<String>>;

/// Frame a byte stream into lines
pub fn frame_lines<S, B, E>(bytes: S) -> LineStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    struct State<S> {
        inner: std::pin::Pin<Box<S>>,
        framer: LineFramer,
        queue: VecDeque<String>,
        finished: bool,
    }

    let state = State {
        inner: Box::pin(bytes),
        framer: LineFramer::default(),
        queue: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.queue.pop_front() {
                return Some((Ok(line), st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    let lines = st.framer.push(bytes.as_ref());
                    st.queue.extend(lines);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    if let Some(rest) = st.framer.finish() {
                        st.queue.push_back(rest);
                    }
                }
            }
        }
    })
    .boxed()
}

/// Opens the underlying transport for a chat stream
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatStreamRequest) -> Result<LineStream>;
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn open(&self, request: &ChatStreamRequest) -> Result<LineStream> {
        debug!(
            "Opening chat stream for session {} (mode {})",
            request.session_id, request.mode
        );
        let builder = self
            .stream_request(Method::POST, CHAT_STREAM_PATH)?
            .header(header::ACCEPT, "text/event-stream, application/x-ndjson")
            .json(request);
        let response = ApiClient::send(builder).await?;
        Ok(frame_lines(response.bytes_stream()))
    }
}

/// Receives the events of one chat stream
///
/// Called from the reader task. Exactly one of `on_error`, `on_done` and
/// `on_cancel` is invoked per stream.
pub trait StreamCallbacks: Send + Sync {
    fn on_chunk(&self, chunk: &StreamChunk);
    fn on_error(&self, error: ApiError, summary: StreamSummary);
    fn on_done(&self, summary: StreamSummary);
    fn on_cancel(&self, _summary: StreamSummary) {}
}

struct StreamShared {
    terminated: AtomicBool,
    tracker: Mutex<SummaryTracker>,
    callbacks: Arc<dyn StreamCallbacks>,
}

impl StreamShared {
    /// Claim the single terminal callback slot
    fn claim_terminal(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    fn summary(&self) -> StreamSummary {
        self.tracker.lock().summary()
    }
}

/// Handle to an in-flight chat stream
///
/// Cloning shares the same stream.
#[derive(Clone)]
pub struct StreamHandle {
    token: CancellationToken,
    finished: CancellationToken,
    shared: Arc<StreamShared>,
}

impl StreamHandle {
    /// Abort the stream; only the first call has an effect
    pub fn cancel(&self) {
        if self.shared.claim_terminal() {
            info!("Chat stream cancelled");
            self.token.cancel();
            self.shared.callbacks.on_cancel(self.shared.summary());
        } else {
            self.token.cancel();
        }
    }

    /// Whether a terminal callback has fired
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Whether the reader task has exited
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait for the reader task to exit
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("terminated", &self.is_terminated())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Spawns reader tasks for chat streams
pub struct StreamReader;

impl StreamReader {
    /// Open a stream and return its handle immediately
    ///
    /// Must be called within a tokio runtime.
    pub fn open(
        transport: Arc<dyn ChatTransport>,
        request: ChatStreamRequest,
        callbacks: Arc<dyn StreamCallbacks>,
    ) -> StreamHandle {
        let token = CancellationToken::new();
        let finished = CancellationToken::new();
        let shared = Arc::new(StreamShared {
            terminated: AtomicBool::new(false),
            tracker: Mutex::new(SummaryTracker::default()),
            callbacks,
        });

        let handle = StreamHandle {
            token: token.clone(),
            finished: finished.clone(),
            shared: shared.clone(),
        };

        tokio::spawn(async move {
            let _finished = finished.drop_guard();
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Stream reader stopped by cancellation");
                }
                _ = read_stream(transport, request, shared) => {}
            }
        });

        handle
    }
}

async fn read_stream(
    transport: Arc<dyn ChatTransport>,
    request: ChatStreamRequest,
    shared: Arc<StreamShared>,
) {
    let mut lines = match transport.open(&request).await {
        Ok(lines) => lines,
        Err(e) => {
            warn!("Failed to open chat stream: {}", e);
            fail(&shared, e);
            return;
        }
    };

    while let Some(next) = lines.next().await {
        let line = match next {
            Ok(line) => line,
            Err(e) => {
                warn!("Chat stream interrupted: {}", e);
                fail(&shared, e);
                return;
            }
        };

        let chunk = match decode_unit(&line) {
            DecodedUnit::Chunk(chunk) => chunk,
            DecodedUnit::Ignored => continue,
            DecodedUnit::Malformed(reason) => {
                debug!("Skipping malformed stream unit: {}", reason);
                continue;
            }
        };

        if let Some(message) = chunk.error.clone() {
            fail(&shared, ApiError::Stream(message));
            return;
        }

        shared.tracker.lock().observe(&chunk);
        if shared.terminated.load(Ordering::SeqCst) {
            return;
        }
        shared.callbacks.on_chunk(&chunk);

        if chunk.done {
            complete(&shared);
            return;
        }
    }

    debug!("Chat stream closed without a done marker");
    complete(&shared);
}

fn fail(shared: &StreamShared, error: ApiError) {
    if shared.claim_terminal() {
        shared.callbacks.on_error(error, shared.summary());
    }
}

fn complete(shared: &StreamShared) {
    if shared.claim_terminal() {
        shared.callbacks.on_done(shared.summary());
    }
}
