//! ragdesk service health monitor
//!
//! A [`HealthMonitor`] keeps a single socket to the backend's health endpoint
//! open for every interested front-end component. It sends `{"type":"ping"}`
//! on connect, every ping interval and on demand, and fans the pushed
//! [`HealthStatus`] out to subscribers. Dropped sockets reconnect with
//! exponential backoff until a forced disconnect.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ragdesk_health::{HealthMonitor, MonitorConfig, WsHealthTransport};
//!
//! # async fn run() -> ragdesk_health::Result<()> {
//! let transport = WsHealthTransport::new("ws://localhost:8000/ws/health")?;
//! let monitor = HealthMonitor::new(Arc::new(transport), MonitorConfig::default());
//! let _subscription = monitor.on_health_status(|status| println!("{}", status.status));
//! monitor.connect();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod monitor;
pub mod transport;

pub use error::{HealthError, Result};
pub use models::{ClientMessage, ConnectionState, HealthStatus, ServerMessage, ServiceStatus};
pub use monitor::{HealthMonitor, MonitorConfig, Subscription};
pub use transport::{
    ChannelTransport, HealthChannel, HealthTransport, Incoming, Outgoing, ServerEnd,
    WsHealthTransport,
};
