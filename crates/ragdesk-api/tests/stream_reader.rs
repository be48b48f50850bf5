//! Stream reader behaviour against HTTP and in-memory transports

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use proptest::prelude::*;
use ragdesk_api::stream::frame_lines;
use ragdesk_api::{
    decode_unit, ApiClient, ApiError, ChatStreamRequest, ChatTransport, ClientConfig, DecodedUnit,
    LineStream, StreamCallbacks, StreamChunk, StreamReader, StreamSummary,
};
use ragdesk_common::AuthState;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Chunk(StreamChunk),
    Error(ApiError),
    Done(StreamSummary),
    Cancelled(StreamSummary),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn content(&self) -> String {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::Chunk(c) => c.chunk.clone(),
                _ => None,
            })
            .collect()
    }

    fn chunk_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Chunk(_)))
            .count()
    }
}

impl StreamCallbacks for Recorder {
    fn on_chunk(&self, chunk: &StreamChunk) {
        self.events.lock().unwrap().push(Event::Chunk(chunk.clone()));
    }

    fn on_error(&self, error: ApiError, _summary: StreamSummary) {
        self.events.lock().unwrap().push(Event::Error(error));
    }

    fn on_done(&self, summary: StreamSummary) {
        self.events.lock().unwrap().push(Event::Done(summary));
    }

    fn on_cancel(&self, summary: StreamSummary) {
        self.events.lock().unwrap().push(Event::Cancelled(summary));
    }
}

/// Transport fed line by line from the test
struct ChannelTransport {
    rx: Mutex<Option<mpsc::UnboundedReceiver<ragdesk_api::Result<String>>>>,
}

impl ChannelTransport {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<ragdesk_api::Result<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                rx: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn open(&self, _request: &ChatStreamRequest) -> ragdesk_api::Result<LineStream> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ApiError::Network("already opened".into()))?;
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }
}

fn line(chunk: &StreamChunk) -> ragdesk_api::Result<String> {
    Ok(format!("data: {}", serde_json::to_string(chunk).unwrap()))
}

async fn wait_for_chunks(recorder: &Recorder, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while recorder.chunk_count() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("chunks did not arrive");
}

fn http_client(server: &MockServer) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(ClientConfig::new(server.uri()), AuthState::new()).unwrap())
}

#[tokio::test]
async fn test_sse_stream_concatenates_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"chunk\": \"Hi\"}\n\n",
        ": keep-alive\n\n",
        "data: {\"tool\": \"search\"}\n\n",
        "data: {\"chunk\": \" there\"}\n\n",
        "data: {\"done\": true, \"tools_used\": [\"search\"]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .and(body_json(serde_json::json!({
            "message": "Hello",
            "session_id": "s1",
            "mode": "chat"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let handle = StreamReader::open(
        http_client(&server),
        ChatStreamRequest::new("Hello", "s1", "chat"),
        recorder.clone(),
    );
    handle.finished().await;

    assert_eq!(recorder.content(), "Hi there");
    assert_eq!(
        recorder.events().last(),
        Some(&Event::Done(StreamSummary {
            content_chunks: 2,
            tools_used: vec!["search".to_string()],
        }))
    );
}

#[tokio::test]
async fn test_ndjson_stream_skips_malformed_units() {
    let server = MockServer::start().await;
    let body = "{\"chunk\": \"a\"}\n{broken\n{\"chunk\": \"b\"}\n{\"done\": true}\n";
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let handle = StreamReader::open(
        http_client(&server),
        ChatStreamRequest::new("q", "s1", "chat"),
        recorder.clone(),
    );
    handle.finished().await;

    assert_eq!(recorder.content(), "ab");
    assert!(matches!(recorder.events().last(), Some(Event::Done(_))));
}

#[tokio::test]
async fn test_error_chunk_stops_stream() {
    let (transport, tx) = ChannelTransport::new();
    let recorder = Arc::new(Recorder::default());
    let handle = StreamReader::open(
        transport,
        ChatStreamRequest::new("q", "s1", "chat"),
        recorder.clone(),
    );

    tx.send(line(&StreamChunk::failed("rate limited"))).unwrap();
    let _ = tx.send(line(&StreamChunk::text("late")));
    handle.finished().await;

    assert_eq!(
        recorder.events(),
        vec![Event::Error(ApiError::Stream("rate limited".to_string()))]
    );
}

#[tokio::test]
async fn test_open_failure_reports_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let handle = StreamReader::open(
        http_client(&server),
        ChatStreamRequest::new("q", "s1", "chat"),
        recorder.clone(),
    );
    handle.finished().await;

    assert_eq!(
        recorder.events(),
        vec![Event::Error(ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(2))
        })]
    );
}

#[tokio::test]
async fn test_mid_stream_network_error() {
    let (transport, tx) = ChannelTransport::new();
    let recorder = Arc::new(Recorder::default());
    let handle = StreamReader::open(
        transport,
        ChatStreamRequest::new("q", "s1", "chat"),
        recorder.clone(),
    );

    tx.send(line(&StreamChunk::text("partial"))).unwrap();
    tx.send(Err(ApiError::Network("connection reset".into()))).unwrap();
    handle.finished().await;

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1], Event::Error(ApiError::Network("connection reset".into())));
}

#[tokio::test]
async fn test_cancel_after_two_of_five_chunks() {
    let (transport, tx) = ChannelTransport::new();
    let recorder = Arc::new(Recorder::default());
    let handle = StreamReader::open(
        transport,
        ChatStreamRequest::new("q", "s1", "chat"),
        recorder.clone(),
    );

    tx.send(line(&StreamChunk::text("one "))).unwrap();
    tx.send(line(&StreamChunk::text("two "))).unwrap();
    wait_for_chunks(&recorder, 2).await;

    handle.cancel();
    handle.cancel();
    for text in ["three ", "four ", "five"] {
        let _ = tx.send(line(&StreamChunk::text(text)));
    }
    let _ = tx.send(line(&StreamChunk::done()));
    handle.finished().await;

    assert_eq!(recorder.content(), "one two ");
    let events = recorder.events();
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[2],
        Event::Cancelled(StreamSummary {
            content_chunks: 2,
            tools_used: vec![],
        })
    );
    assert!(handle.is_terminated());
}

#[tokio::test]
async fn test_cancel_after_done_has_no_effect() {
    let (transport, tx) = ChannelTransport::new();
    let recorder = Arc::new(Recorder::default());
    let handle = StreamReader::open(
        transport,
        ChatStreamRequest::new("q", "s1", "chat"),
        recorder.clone(),
    );

    tx.send(line(&StreamChunk::text("x"))).unwrap();
    tx.send(line(&StreamChunk::done())).unwrap();
    handle.finished().await;
    handle.cancel();

    let events = recorder.events();
    assert!(matches!(events.last(), Some(Event::Done(_))));
    assert!(!events.iter().any(|e| matches!(e, Event::Cancelled(_))));
}

proptest! {
    #[test]
    fn prop_framed_content_is_ordered_concatenation(
        chunks in prop::collection::vec("[a-zA-Z0-9 äö€]{0,12}", 0..12),
        split in 1usize..17,
    ) {
        let mut body = String::new();
        for chunk in &chunks {
            body.push_str("data: ");
            body.push_str(&serde_json::to_string(&StreamChunk::text(chunk.clone())).unwrap());
            body.push_str("\n\n");
        }
        body.push_str("data: {\"done\": true}\n\n");

        let pieces: Vec<Result<Vec<u8>, ApiError>> = body
            .as_bytes()
            .chunks(split)
            .map(|piece| Ok(piece.to_vec()))
            .collect();

        let lines: Vec<String> = futures::executor::block_on(
            frame_lines(stream::iter(pieces)).map(|l| l.unwrap()).collect(),
        );

        let mut content = String::new();
        let mut saw_done = false;
        for line in lines {
            if let DecodedUnit::Chunk(chunk) = decode_unit(&line) {
                prop_assert!(!saw_done);
                if chunk.done {
                    saw_done = true;
                }
                if let Some(text) = chunk.chunk {
                    content.push_str(&text);
                }
            }
        }
        prop_assert!(saw_done);
        prop_assert_eq!(content, chunks.concat());
    }
}
