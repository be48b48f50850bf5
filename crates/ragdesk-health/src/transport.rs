//! Socket transports for the health monitor
//!
//! [`WsHealthTransport`] talks to the backend's `/ws/health` endpoint.
//! [`ChannelTransport`] is an in-process pair of channels with the same
//! framing, handy for front-ends that simulate the backend and for tests.

use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::channel::mpsc as frames;
use futures::future;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use ragdesk_common::AuthState;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::error::{HealthError, Result};
use crate::models::HealthStatus;

/// Text frames sent to the server
pub type Outgoing = Pin<Box<dyn Sink<String, Error = HealthError> + Send>>;

/// Text frames received from the server
pub type Incoming = BoxStream<'static, Result<String>>;

/// An open socket, split into its two directions
pub struct HealthChannel {
    pub outgoing: Outgoing,
    pub incoming: Incoming,
}

/// Opens health sockets
#[async_trait]
pub trait HealthTransport: Send + Sync {
    async fn connect(&self) -> Result<HealthChannel>;
}

/// WebSocket transport
pub struct WsHealthTransport {
    url: Url,
    auth: Option<AuthState>,
}

impl WsHealthTransport {
    /// Create a transport for a `ws://` or `wss://` URL
    pub fn new(url: &str) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| HealthError::InvalidUrl(format!("{}: {}", url, e)))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(Self {
                url: parsed,
                auth: None,
            }),
            other => Err(HealthError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                url, other
            ))),
        }
    }

    /// Send the current bearer token as a `token` query parameter
    pub fn with_auth(mut self, auth: AuthState) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        if let Some(token) = self.auth.as_ref().and_then(AuthState::token) {
            url.query_pairs_mut().append_pair("token", &token);
        }
        url
    }
}

#[async_trait]
impl HealthTransport for WsHealthTransport {
    async fn connect(&self) -> Result<HealthChannel> {
        debug!("Opening health socket {}", self.url);
        let (socket, _response) = connect_async(self.request_url().as_str())
            .await
            .map_err(|e| HealthError::Connect(e.to_string()))?;

        let (sink, stream) = socket.split();
        let outgoing = sink
            .sink_map_err(|e| HealthError::Send(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, HealthError>(Message::Text(text))));
        let incoming = stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => String::from_utf8(data).ok().map(Ok),
                // Control frames are answered by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(HealthError::Receive(e.to_string()))),
            })
        });

        Ok(HealthChannel {
            outgoing: Box::pin(outgoing),
            incoming: incoming.boxed(),
        })
    }
}

/// The server side of a [`ChannelTransport`] connection
pub struct ServerEnd {
    received: frames::UnboundedReceiver<String>,
    push: frames::UnboundedSender<Result<String>>,
}

impl ServerEnd {
    /// Next frame the client sent; `None` once the client closed
    pub async fn next_message(&mut self) -> Option<String> {
        self.received.next().await
    }

    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.push.unbounded_send(Ok(text.into())).is_ok()
    }

    pub fn push_status(&self, status: &HealthStatus) -> bool {
        match serde_json::to_string(status) {
            Ok(text) => self.push_text(text),
            Err(_) => false,
        }
    }

    /// Break the connection with a receive error
    pub fn fail(&self, error: HealthError) -> bool {
        self.push.unbounded_send(Err(error)).is_ok()
    }
}

/// In-process transport; every accepted connection is handed to the
/// receiver returned by [`ChannelTransport::new`]
pub struct ChannelTransport {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    refuse: AtomicU32,
    attempts: AtomicU32,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let transport = Self {
            accepted,
            refuse: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        };
        (transport, rx)
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Connection attempts so far, refused ones included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthTransport for ChannelTransport {
    async fn connect(&self) -> Result<HealthChannel> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(HealthError::Connect("connection refused".to_string()));
        }

        let (client_tx, server_rx) = frames::unbounded();
        let (server_tx, client_rx) = frames::unbounded();
        let server = ServerEnd {
            received: server_rx,
            push: server_tx,
        };
        self.accepted
            .send(server)
            .map_err(|_| HealthError::Connect("no listener".to_string()))?;

        Ok(HealthChannel {
            outgoing: Box::pin(client_tx.sink_map_err(|e| HealthError::Send(e.to_string()))),
            incoming: client_rx.boxed(),
        })
    }
}
