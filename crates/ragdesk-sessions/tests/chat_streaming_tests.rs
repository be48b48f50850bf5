//! Streaming replies into the chat store

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use proptest::prelude::*;
use ragdesk_api::{
    ApiError, ChatStreamRequest, ChatTransport, LineStream, NotificationLevel, StreamChunk,
    StreamSummary,
};
use ragdesk_common::{AuthSession, AuthState, ClientStorage, UserInfo, UserRole};
use ragdesk_sessions::{
    BusEvent, ChatController, ChatOptions, ChatStore, EventBus, LocalSessionStore, Message,
    MessageEvent, SessionError, StoreConfig, StreamEvent, StreamOutcome, StreamTag,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

type Sender = mpsc::UnboundedSender<ragdesk_api::Result<String>>;

/// Transport whose lines are pushed by the test, one channel per opened stream
#[derive(Default)]
struct ScriptedTransport {
    requests: Mutex<Vec<ChatStreamRequest>>,
    senders: Mutex<Vec<Sender>>,
}

impl ScriptedTransport {
    fn sender(&self, index: usize) -> Sender {
        self.senders.lock().unwrap()[index].clone()
    }

    fn requests(&self) -> Vec<ChatStreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, request: &ChatStreamRequest) -> ragdesk_api::Result<LineStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.requests.lock().unwrap().push(request.clone());
        self.senders.lock().unwrap().push(tx);
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }
}

fn send(tx: &Sender, chunk: StreamChunk) {
    let _ = tx.send(Ok(serde_json::to_string(&chunk).unwrap()));
}

struct Harness {
    store: Arc<ChatStore>,
    transport: Arc<ScriptedTransport>,
    chat: ChatController,
    dir: TempDir,
}

fn harness(auth: AuthState) -> Harness {
    let dir = TempDir::new().unwrap();
    let local = LocalSessionStore::new(ClientStorage::open(dir.path()).unwrap());
    let store = ChatStore::new(StoreConfig::default(), local, None, auth, EventBus::new());
    let transport = Arc::new(ScriptedTransport::default());
    let chat = ChatController::new(store.clone(), transport.clone(), ChatOptions::default());
    Harness {
        store,
        transport,
        chat,
        dir,
    }
}

async fn opened(transport: &ScriptedTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.senders.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("stream was not opened");
}

async fn until(store: &ChatStore, f: impl Fn(&[Message]) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !f(&store.messages()) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_hello_hi_there() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("Hello").unwrap();
    assert_eq!(h.store.messages(), vec![Message::user("Hello"), Message::assistant("")]);
    assert!(h.store.is_streaming());

    opened(&h.transport, 1).await;
    let tx = h.transport.sender(0);
    send(&tx, StreamChunk::text("Hi"));
    send(&tx, StreamChunk::text(" there"));
    send(&tx, StreamChunk::done());
    handle.finished().await;

    let messages = h.store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Hi there");
    assert!(!h.store.is_streaming());

    let request = &h.transport.requests()[0];
    assert_eq!(request.message, "Hello");
    assert_eq!(request.session_id, h.store.current_session_id());
    assert_eq!(request.mode, "chat");
}

#[tokio::test]
async fn test_error_first_chunk_rolls_back_placeholder() {
    let h = harness(AuthState::new());
    let mut events = h.store.bus().subscribe();

    let handle = h.chat.send_message("Hello").unwrap();
    opened(&h.transport, 1).await;
    send(&h.transport.sender(0), StreamChunk::failed("rate limited"));
    handle.finished().await;

    assert_eq!(h.store.messages(), vec![Message::user("Hello")]);
    assert!(!h.store.is_streaming());

    let mut notification = None;
    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            BusEvent::Notification(n) => notification = Some(n),
            BusEvent::Stream(StreamEvent::Failed { error, .. }) => {
                failed = error.contains("rate limited")
            }
            _ => {}
        }
    }
    assert!(failed);
    let notification = notification.expect("a notification is raised");
    assert_eq!(notification.level, NotificationLevel::Warning);
    assert!(notification.message.contains("rate limited"));
}

#[tokio::test]
async fn test_stop_after_two_of_five_chunks() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("count").unwrap();
    opened(&h.transport, 1).await;
    let tx = h.transport.sender(0);
    send(&tx, StreamChunk::text("one "));
    send(&tx, StreamChunk::text("two "));
    until(&h.store, |m| m[1].content == "one two ").await;

    assert!(h.chat.stop());
    assert!(!h.chat.stop());
    let mut events = h.store.bus().subscribe();

    send(&tx, StreamChunk::text("three "));
    send(&tx, StreamChunk::text("four "));
    send(&tx, StreamChunk::text("five"));
    send(&tx, StreamChunk::done());
    handle.finished().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.store.messages()[1].content, "one two ");
    assert!(!h.store.is_streaming());
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, BusEvent::Message(MessageEvent::Updated { .. })),
            "message mutated after stop: {:?}",
            event
        );
    }
}

#[tokio::test]
async fn test_stop_before_content_removes_placeholder() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("anyone there?").unwrap();
    opened(&h.transport, 1).await;
    h.chat.stop();
    handle.finished().await;

    assert_eq!(h.store.messages(), vec![Message::user("anyone there?")]);
}

#[tokio::test]
async fn test_done_without_content_removes_placeholder() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("ping").unwrap();
    opened(&h.transport, 1).await;
    let tx = h.transport.sender(0);
    send(
        &tx,
        StreamChunk {
            tool: Some("search".into()),
            ..Default::default()
        },
    );
    send(&tx, StreamChunk::done());
    handle.finished().await;

    assert_eq!(h.store.messages().len(), 1);
}

#[tokio::test]
async fn test_final_tools_take_precedence() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("look it up").unwrap();
    opened(&h.transport, 1).await;
    let tx = h.transport.sender(0);
    send(
        &tx,
        StreamChunk {
            tool: Some("web".into()),
            chunk: Some("Found it".into()),
            ..Default::default()
        },
    );
    send(
        &tx,
        StreamChunk {
            done: true,
            tools_used: Some(vec!["rag".into()]),
            ..Default::default()
        },
    );
    handle.finished().await;

    assert_eq!(h.store.messages()[1].tools_used, Some(vec!["rag".to_string()]));
}

#[tokio::test]
async fn test_second_send_rejected_while_streaming() {
    let h = harness(AuthState::new());

    let _handle = h.chat.send_message("first").unwrap();
    assert!(matches!(
        h.chat.send_message("second"),
        Err(SessionError::StreamInFlight)
    ));
    assert!(matches!(h.chat.send_message("   "), Err(SessionError::Invalid(_))));
    assert_eq!(h.store.messages().len(), 2);
}

#[tokio::test]
async fn test_switching_session_discards_trailing_chunks() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("long answer please").unwrap();
    let first = h.store.current_session_id();
    opened(&h.transport, 1).await;
    let tx = h.transport.sender(0);
    send(&tx, StreamChunk::text("partial"));
    until(&h.store, |m| m.len() == 2 && m[1].content == "partial").await;

    let second = h.store.create_new_session().await;
    assert!(!h.store.is_streaming());
    send(&tx, StreamChunk::text(" leaked"));
    handle.finished().await;

    assert_eq!(h.store.current_session_id(), second);
    assert!(h.store.messages().is_empty());

    h.store.set_current_session(&first).await.unwrap();
    assert_eq!(h.store.messages()[1].content, "partial");
}

#[tokio::test]
async fn test_deleting_streaming_session_discards_reply() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("draft a memo").unwrap();
    let doomed = h.store.current_session_id();
    opened(&h.transport, 1).await;
    let tx = h.transport.sender(0);
    send(&tx, StreamChunk::text("Dear team"));
    until(&h.store, |m| m.len() == 2 && m[1].content == "Dear team").await;

    h.store.delete_session(&doomed).await.unwrap();
    assert!(!h.store.is_streaming());
    let fresh = h.store.current_session_id();
    assert_ne!(fresh, doomed);
    assert!(h.store.messages().is_empty());

    send(&tx, StreamChunk::text(", leaked"));
    send(&tx, StreamChunk::done());
    handle.finished().await;
    h.store.save_current_session_messages().await.unwrap();

    assert_eq!(h.store.current_session_id(), fresh);
    assert!(h.store.messages().is_empty());
    assert!(h.store.sessions().iter().all(|s| s.session_id != doomed));
    let local = LocalSessionStore::new(ClientStorage::open(h.dir.path()).unwrap());
    assert!(!local.has_messages(&doomed));
    assert!(local.list_sessions().is_empty());
}

#[tokio::test]
async fn test_stale_tag_is_ignored() {
    let h = harness(AuthState::new());

    let tag = h.store.begin_stream("hi").unwrap();
    let stale = StreamTag {
        generation: tag.generation + 1,
        ..tag.clone()
    };
    assert!(!h.store.apply_chunk(&stale, &StreamChunk::text("nope")));
    h.store
        .finish_stream(&stale, StreamSummary::default(), StreamOutcome::Completed);
    assert!(h.store.is_streaming());

    assert!(h.store.apply_chunk(&tag, &StreamChunk::text("yes")));
    h.store.finish_stream(&tag, StreamSummary::default(), StreamOutcome::Completed);
    assert_eq!(h.store.messages()[1].content, "yes");
    assert!(!h.store.is_streaming());
}

#[tokio::test]
async fn test_logout_cancels_stream() {
    let auth = AuthState::with_session(AuthSession::new(
        "tok",
        UserInfo {
            id: "1".into(),
            email: "ada@example.com".into(),
            name: None,
            role: UserRole::User,
        },
    ));
    let h = harness(auth.clone());
    let watcher = h.store.spawn_auth_watch();

    let handle = h.chat.send_message("hello").unwrap();
    opened(&h.transport, 1).await;
    send(&h.transport.sender(0), StreamChunk::text("Hi"));
    until(&h.store, |m| m[1].content == "Hi").await;

    auth.logout();
    handle.finished().await;
    assert!(!h.store.is_streaming());
    assert_eq!(h.store.messages()[1].content, "Hi");
    watcher.abort();
}

#[tokio::test]
async fn test_options_flow_into_request() {
    let h = harness(AuthState::new());
    h.chat.set_options(ChatOptions {
        mode: "rag".into(),
        use_react: true,
        collection_id: Some("c1".into()),
    });

    let _handle = h.chat.send_message("  what is in the manual?  ").unwrap();
    opened(&h.transport, 1).await;

    let request = &h.transport.requests()[0];
    assert_eq!(request.message, "what is in the manual?");
    assert_eq!(request.mode, "rag");
    assert_eq!(request.collection_id.as_deref(), Some("c1"));
    assert_eq!(request.use_react, Some(true));
}

#[tokio::test]
async fn test_transport_error_mid_stream() {
    let h = harness(AuthState::new());

    let handle = h.chat.send_message("q").unwrap();
    opened(&h.transport, 1).await;
    let tx = h.transport.sender(0);
    send(&tx, StreamChunk::text("half an ans"));
    let _ = tx.send(Err(ApiError::Network("connection reset".into())));
    handle.finished().await;

    assert_eq!(h.store.messages(), vec![Message::user("q")]);
    assert!(!h.store.is_streaming());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_final_content_is_concatenation(
        chunks in prop::collection::vec("[a-z ]{0,6}", 0..8),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let messages = runtime.block_on(async {
            let h = harness(AuthState::new());
            let handle = h.chat.send_message("go").unwrap();
            opened(&h.transport, 1).await;
            let tx = h.transport.sender(0);
            for chunk in &chunks {
                send(&tx, StreamChunk::text(chunk.clone()));
            }
            send(&tx, StreamChunk::done());
            handle.finished().await;
            h.store.messages()
        });

        let expected = chunks.concat();
        if expected.is_empty() {
            prop_assert_eq!(messages.len(), 1);
        } else {
            prop_assert_eq!(messages.len(), 2);
            prop_assert_eq!(&messages[1].content, &expected);
        }
    }
}
