//! Event bus for observing the chat store
//!
//! Front-ends subscribe to render changes instead of polling the store. Built
//! on a tokio broadcast channel; slow subscribers lose the oldest events.
//!
//! # Example
//!
//! ```rust
//! use ragdesk_sessions::bus::{BusEvent, EventBus, SessionEvent};
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::new();
//! let mut subscriber = bus.subscribe();
//!
//! bus.publish(BusEvent::Session(SessionEvent::Created {
//!     session_id: "s-1".to_string(),
//! }));
//!
//! let event = subscriber.recv().await.unwrap();
//! assert!(matches!(event, BusEvent::Session(SessionEvent::Created { .. })));
//! # });
//! ```

pub mod events;

pub use events::{MessageEvent, SessionEvent, StreamEvent};

use ragdesk_api::Notification;
use tokio::sync::broadcast;

/// Channel capacity for broadcast events
const CHANNEL_CAPACITY: usize = 1024;

/// Unified event type for all bus events
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Session(SessionEvent),
    Message(MessageEvent),
    Stream(StreamEvent),
    /// Transient message for the user
    Notification(Notification),
}

/// Event bus for store events
///
/// Clones share the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; a bus with none drops the event
    pub fn publish(&self, event: BusEvent) {
        let _ = self.sender.send(event);
    }

    pub fn notify(&self, notification: Notification) {
        self.publish(BusEvent::Notification(notification));
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
