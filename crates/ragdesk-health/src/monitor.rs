//! Health monitor: one shared socket, many subscribers

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use ragdesk_common::AuthState;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HealthError, Result};
use crate::models::{ClientMessage, ConnectionState, HealthStatus, ServerMessage};
use crate::transport::{HealthChannel, HealthTransport};

/// Timing knobs for the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Periodic ping while connected
    pub ping_interval: Duration,
    /// On-demand pings closer together than this are dropped
    pub ping_coalesce: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            ping_coalesce: Duration::from_millis(500),
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Exponential reconnect delay, doubling up to a ceiling
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.next = self.initial;
    }
}

type StatusCallback = Arc<dyn Fn(&HealthStatus) + Send + Sync>;
type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    status: HashMap<u64, StatusCallback>,
    state: HashMap<u64, StateCallback>,
    /// A polite disconnect arrived while others were still listening
    release_when_idle: bool,
}

impl Subscribers {
    fn len(&self) -> usize {
        self.status.len() + self.state.len()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Connection {
    id: u64,
    cancel: CancellationToken,
    pings: mpsc::UnboundedSender<()>,
}

struct Shared {
    transport: Arc<dyn HealthTransport>,
    config: MonitorConfig,
    state: watch::Sender<ConnectionState>,
    status: watch::Sender<Option<HealthStatus>>,
    subscribers: Mutex<Subscribers>,
    connection: Mutex<Option<Connection>>,
    next_connection: AtomicU64,
    last_ping: Mutex<Option<Instant>>,
}

impl Shared {
    fn is_current(connection: &Option<Connection>, id: u64) -> bool {
        connection.as_ref().map(|c| c.id) == Some(id)
    }

    /// Move to `next` if connection `id` still owns the socket
    fn set_state(&self, id: u64, next: ConnectionState) {
        let changed = {
            let connection = self.connection.lock();
            if !Self::is_current(&connection, id) {
                return;
            }
            self.replace_state(next)
        };
        if changed {
            self.notify_state(next);
        }
    }

    fn replace_state(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    fn notify_state(&self, state: ConnectionState) {
        debug!("Health socket {}", state);
        let callbacks: Vec<StateCallback> = self.subscribers.lock().state.values().cloned().collect();
        for callback in callbacks {
            callback(state);
        }
    }

    fn publish_status(&self, id: u64, status: HealthStatus) {
        {
            let connection = self.connection.lock();
            if !Self::is_current(&connection, id) {
                debug!("Dropping status from stale health socket");
                return;
            }
            self.status.send_replace(Some(status.clone()));
        }
        let callbacks: Vec<StatusCallback> =
            self.subscribers.lock().status.values().cloned().collect();
        for callback in callbacks {
            callback(&status);
        }
    }

    fn handle_frame(&self, id: u64, text: &str) {
        match ServerMessage::parse(text) {
            ServerMessage::Status(status) => {
                debug!("Health status {} ({} MCP servers)", status.status, status.mcp_servers);
                self.publish_status(id, status);
            }
            ServerMessage::Pong => debug!("Health pong"),
            ServerMessage::Other => debug!("Ignoring health frame: {}", text),
        }
    }

    fn note_ping(&self) {
        *self.last_ping.lock() = Some(Instant::now());
    }

    /// Reserve the next on-demand ping slot
    fn claim_ping(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_ping.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.config.ping_coalesce => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Tear down the current connection, if any
    fn close(&self) -> bool {
        let (taken, changed) = {
            let mut connection = self.connection.lock();
            let taken = connection.take();
            (taken, self.replace_state(ConnectionState::Disconnected))
        };
        self.subscribers.lock().release_when_idle = false;

        if let Some(connection) = &taken {
            connection.cancel.cancel();
            info!("Health socket closed");
        }
        if changed {
            self.notify_state(ConnectionState::Disconnected);
        }
        taken.is_some()
    }

    fn unsubscribe(&self, id: u64) {
        let release = {
            let mut subscribers = self.subscribers.lock();
            let removed =
                subscribers.status.remove(&id).is_some() | subscribers.state.remove(&id).is_some();
            removed && subscribers.len() == 0 && subscribers.release_when_idle
        };
        if release {
            debug!("Last health subscriber left; closing deferred connection");
            self.close();
        }
    }

    async fn run(
        self: Arc<Self>,
        id: u64,
        cancel: CancellationToken,
        mut pings: mpsc::UnboundedReceiver<()>,
    ) {
        let mut backoff = Backoff::new(self.config.reconnect_initial, self.config.reconnect_max);
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.set_state(id, ConnectionState::Connecting);

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                attempt = self.transport.connect() => attempt,
            };

            match attempt {
                Ok(channel) => {
                    info!("Health socket connected");
                    self.set_state(id, ConnectionState::Connected);
                    backoff.reset();
                    match self.serve(id, channel, &cancel, &mut pings).await {
                        Ok(()) => break,
                        Err(e) => warn!("Health socket dropped: {}", e),
                    }
                }
                Err(e) => warn!("{}", e),
            }

            self.set_state(id, ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            info!("Reconnecting health socket in {:?}", delay);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
        debug!("Health connection {} finished", id);
    }

    /// Pump one open socket until it fails or is cancelled
    async fn serve(
        &self,
        id: u64,
        channel: HealthChannel,
        cancel: &CancellationToken,
        pings: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<()> {
        let HealthChannel {
            mut outgoing,
            mut incoming,
        } = channel;
        let ping = ClientMessage::Ping.to_text();

        // Requests queued while disconnected are covered by the opening ping
        while pings.try_recv().is_ok() {}
        self.note_ping();
        outgoing.send(ping.clone()).await?;

        let period = self.config.ping_interval;
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = outgoing.close().await;
                    return Ok(());
                }
                frame = incoming.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(id, &text),
                    Some(Err(e)) => return Err(e),
                    None => return Err(HealthError::Closed),
                },
                Some(()) = pings.recv() => {
                    debug!("Sending requested health ping");
                    outgoing.send(ping.clone()).await?;
                }
                _ = ticker.tick() => {
                    self.note_ping();
                    outgoing.send(ping.clone()).await?;
                }
            }
        }
    }
}

/// Handle returned by the `on_*` registration methods
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// Keeps one health socket open for everyone interested in service health
///
/// Cloning shares the same socket and subscriber list.
#[derive(Clone)]
pub struct HealthMonitor {
    shared: Arc<Shared>,
}

impl HealthMonitor {
    pub fn new(transport: Arc<dyn HealthTransport>, config: MonitorConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (status, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                state,
                status,
                subscribers: Mutex::new(Subscribers::default()),
                connection: Mutex::new(None),
                next_connection: AtomicU64::new(1),
                last_ping: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Start the socket; returns `false` when it is already running
    pub fn connect(&self) -> bool {
        let (id, cancel, pings) = {
            let mut connection = self.shared.connection.lock();
            if connection.is_some() {
                debug!("Health socket already running");
                return false;
            }
            let id = self.shared.next_connection.fetch_add(1, Ordering::SeqCst);
            let cancel = CancellationToken::new();
            let (tx, rx) = mpsc::unbounded_channel();
            *connection = Some(Connection {
                id,
                cancel: cancel.clone(),
                pings: tx,
            });
            (id, cancel, rx)
        };
        self.shared.subscribers.lock().release_when_idle = false;
        self.shared.set_state(id, ConnectionState::Connecting);

        tokio::spawn(self.shared.clone().run(id, cancel, pings));
        true
    }

    /// Close the socket
    ///
    /// Without `force` the close is deferred while subscribers remain and
    /// happens once the last one unsubscribes. A forced close also stops
    /// any pending reconnect. Returns whether a connection was closed now.
    pub fn disconnect(&self, force: bool) -> bool {
        if !force {
            let mut subscribers = self.shared.subscribers.lock();
            if subscribers.len() > 0 {
                debug!(
                    "Deferring health disconnect; {} subscribers remain",
                    subscribers.len()
                );
                subscribers.release_when_idle = true;
                return false;
            }
        }
        self.shared.close()
    }

    /// Drop any stale socket and open a fresh one
    pub fn reconnect(&self) {
        self.disconnect(true);
        self.connect();
    }

    /// Whether a connection (or reconnect loop) is running
    pub fn is_running(&self) -> bool {
        self.shared.connection.lock().is_some()
    }

    pub fn on_health_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HealthStatus) + Send + Sync + 'static,
    {
        let mut subscribers = self.shared.subscribers.lock();
        let id = subscribers.allocate();
        subscribers.status.insert(id, Arc::new(callback));
        self.subscription(id)
    }

    pub fn on_connection_state<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let mut subscribers = self.shared.subscribers.lock();
        let id = subscribers.allocate();
        subscribers.state.insert(id, Arc::new(callback));
        self.subscription(id)
    }

    fn subscription(&self, id: u64) -> Subscription {
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
            active: true,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Ask the server for a fresh status now
    ///
    /// Returns `false` when not connected or when another ping went out
    /// within the coalescing window.
    pub fn ping(&self) -> bool {
        let pings = {
            let connection = self.shared.connection.lock();
            match connection.as_ref() {
                Some(c) if self.state() == ConnectionState::Connected => c.pings.clone(),
                _ => return false,
            }
        };
        if !self.shared.claim_ping() {
            debug!("Coalesced health ping");
            return false;
        }
        pings.send(()).is_ok()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Last status pushed by the server
    pub fn status(&self) -> Option<HealthStatus> {
        self.shared.status.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<Option<HealthStatus>> {
        self.shared.status.subscribe()
    }

    /// Forget the cached status
    pub fn clear_status(&self) {
        self.shared.status.send_replace(None);
    }

    /// Run the socket only while someone is logged in
    ///
    /// Every new token gets a fresh connection. Logout clears the cached
    /// status and force-closes the socket.
    pub fn follow_auth(&self, auth: &AuthState) -> JoinHandle<()> {
        let mut changes = auth.subscribe();
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut token = changes.borrow_and_update().as_ref().map(|s| s.token.clone());
            if token.is_some() {
                monitor.reconnect();
            }
            while changes.changed().await.is_ok() {
                let next = changes.borrow_and_update().as_ref().map(|s| s.token.clone());
                if next == token {
                    continue;
                }
                token = next;
                if token.is_some() {
                    monitor.reconnect();
                } else {
                    info!("Logged out; stopping health monitor");
                    // Close first: once the socket is detached no frame can republish
                    monitor.disconnect(true);
                    monitor.clear_status();
                }
            }
        })
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("state", &self.state())
            .field("status", &self.status())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
