//! Health monitor behaviour over the in-process channel transport

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ragdesk_common::{AuthSession, AuthState, UserInfo, UserRole};
use ragdesk_health::{
    ChannelTransport, ConnectionState, HealthError, HealthMonitor, HealthStatus, MonitorConfig,
    ServerEnd, ServiceStatus,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Instant};

const PING: &str = r#"{"type":"ping"}"#;

fn monitor() -> (HealthMonitor, Arc<ChannelTransport>, UnboundedReceiver<ServerEnd>) {
    let (transport, accepted) = ChannelTransport::new();
    let transport = Arc::new(transport);
    let monitor = HealthMonitor::new(transport.clone(), MonitorConfig::default());
    (monitor, transport, accepted)
}

fn status(status: ServiceStatus, mcp_servers: u32) -> HealthStatus {
    HealthStatus {
        status,
        mcp_servers,
    }
}

async fn until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

/// Accept the next connection and consume its opening ping
async fn accept(accepted: &mut UnboundedReceiver<ServerEnd>) -> ServerEnd {
    let mut server = accepted.recv().await.expect("transport dropped");
    assert_eq!(server.next_message().await.as_deref(), Some(PING));
    server
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let (monitor, transport, mut accepted) = monitor();

    assert!(monitor.connect());
    assert!(!monitor.connect());
    let _server = accept(&mut accepted).await;
    assert!(!monitor.connect());

    assert_eq!(monitor.state(), ConnectionState::Connected);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_independent_status_subscribers() {
    let (monitor, _transport, mut accepted) = monitor();
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    let sink = first.clone();
    let sub_first = monitor.on_health_status(move |s| sink.lock().push(s.clone()));
    let sink = second.clone();
    let _sub_second = monitor.on_health_status(move |s| sink.lock().push(s.clone()));
    assert_eq!(monitor.subscriber_count(), 2);

    monitor.connect();
    let server = accept(&mut accepted).await;

    server.push_status(&status(ServiceStatus::Healthy, 2));
    until(|| second.lock().len() == 1).await;
    assert_eq!(first.lock().len(), 1);
    assert_eq!(monitor.status(), Some(status(ServiceStatus::Healthy, 2)));

    sub_first.unsubscribe();
    assert_eq!(monitor.subscriber_count(), 1);

    server.push_text(r#"{"type":"health_status","status":"unhealthy","mcp_servers":0}"#);
    until(|| second.lock().len() == 2).await;
    assert_eq!(first.lock().len(), 1);
    assert!(!monitor.status().unwrap().is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_ignores_unknown_frames() {
    let (monitor, _transport, mut accepted) = monitor();
    monitor.connect();
    let server = accept(&mut accepted).await;

    server.push_text("garbage");
    server.push_text(r#"{"type":"pong"}"#);
    server.push_status(&status(ServiceStatus::Healthy, 1));
    until(|| monitor.status().is_some()).await;
    assert_eq!(monitor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_on_demand_pings_coalesce() {
    let (monitor, _transport, mut accepted) = monitor();
    assert!(!monitor.ping());

    monitor.connect();
    let mut server = accept(&mut accepted).await;

    // Opening ping was just sent
    assert!(!monitor.ping());

    sleep(Duration::from_millis(600)).await;
    assert!(monitor.ping());
    assert!(!monitor.ping());
    assert_eq!(server.next_message().await.as_deref(), Some(PING));

    sleep(Duration::from_millis(499)).await;
    assert!(!monitor.ping());
    sleep(Duration::from_millis(2)).await;
    assert!(monitor.ping());
    assert_eq!(server.next_message().await.as_deref(), Some(PING));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_ping() {
    let (monitor, _transport, mut accepted) = monitor();
    monitor.connect();
    let mut server = accept(&mut accepted).await;

    let start = Instant::now();
    assert_eq!(server.next_message().await.as_deref(), Some(PING));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(30), "pinged after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(31), "pinged after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff() {
    let (monitor, transport, mut accepted) = monitor();
    transport.refuse_next(2);

    let start = Instant::now();
    monitor.connect();
    let server = accept(&mut accepted).await;
    let elapsed = start.elapsed();
    // 1 s after the first refusal, 2 s after the second
    assert!(elapsed >= Duration::from_secs(3), "connected after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "connected after {:?}", elapsed);
    assert_eq!(transport.attempts(), 3);

    // A successful connection resets the delay
    drop(server);
    let dropped = Instant::now();
    let _server = accept(&mut accepted).await;
    let elapsed = dropped.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "reconnected after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "reconnected after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_receive_error_triggers_reconnect() {
    let (monitor, transport, mut accepted) = monitor();
    monitor.connect();
    let server = accept(&mut accepted).await;

    server.fail(HealthError::Receive("reset by peer".to_string()));
    let _server = accept(&mut accepted).await;
    assert_eq!(transport.attempts(), 2);
    assert_eq!(monitor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_forced_disconnect_stops_reconnecting() {
    let (monitor, transport, mut accepted) = monitor();
    let _sub = monitor.on_connection_state(|_| {});
    monitor.connect();
    let mut server = accept(&mut accepted).await;

    assert!(monitor.disconnect(true));
    assert_eq!(monitor.state(), ConnectionState::Disconnected);
    assert!(!monitor.is_running());

    // Client side closes its half
    assert_eq!(server.next_message().await, None);
    assert!(timeout(Duration::from_secs(120), accepted.recv()).await.is_err());
    assert_eq!(transport.attempts(), 1);
    assert!(!monitor.disconnect(true));
}

#[tokio::test(start_paused = true)]
async fn test_polite_disconnect_waits_for_subscribers() {
    let (monitor, _transport, mut accepted) = monitor();
    let subscription = monitor.on_health_status(|_| {});
    monitor.connect();
    let _server = accept(&mut accepted).await;

    assert!(!monitor.disconnect(false));
    assert!(monitor.is_running());
    assert_eq!(monitor.state(), ConnectionState::Connected);

    drop(subscription);
    assert!(!monitor.is_running());
    assert_eq!(monitor.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_polite_disconnect_without_subscribers() {
    let (monitor, _transport, mut accepted) = monitor();
    monitor.connect();
    let _server = accept(&mut accepted).await;

    assert!(monitor.disconnect(false));
    assert!(!monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_connection_state_transitions() {
    let (monitor, _transport, mut accepted) = monitor();
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    let _sub = monitor.on_connection_state(move |state| sink.lock().push(state));

    monitor.connect();
    let server = accept(&mut accepted).await;
    drop(server);
    let _server = accept(&mut accepted).await;
    monitor.disconnect(true);

    use ConnectionState::*;
    assert_eq!(
        *states.lock(),
        vec![Connecting, Connected, Disconnected, Connecting, Connected, Disconnected]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_socket_status_is_dropped() {
    let (monitor, _transport, mut accepted) = monitor();
    monitor.connect();
    let stale = accept(&mut accepted).await;

    monitor.reconnect();
    let fresh = accept(&mut accepted).await;

    stale.push_status(&status(ServiceStatus::Unhealthy, 0));
    fresh.push_status(&status(ServiceStatus::Healthy, 4));
    until(|| monitor.status().is_some()).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(monitor.status(), Some(status(ServiceStatus::Healthy, 4)));
}

#[tokio::test(start_paused = true)]
async fn test_follows_login_and_logout() {
    let (monitor, _transport, mut accepted) = monitor();
    let auth = AuthState::new();
    let watcher = monitor.follow_auth(&auth);

    auth.login(AuthSession::new(
        "token-1",
        UserInfo {
            id: "1".into(),
            email: "ada@example.com".into(),
            name: None,
            role: UserRole::User,
        },
    ));
    let server = accept(&mut accepted).await;
    server.push_status(&status(ServiceStatus::Healthy, 1));
    until(|| monitor.status().is_some()).await;

    auth.logout();
    until(|| monitor.status().is_none()).await;
    until(|| !monitor.is_running()).await;
    assert_eq!(monitor.state(), ConnectionState::Disconnected);

    // A late frame from the torn-down socket does not resurrect the status
    server.push_status(&status(ServiceStatus::Healthy, 1));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(monitor.status(), None);

    watcher.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_logout_during_status_burst_leaves_no_status() {
    let (monitor, _transport, mut accepted) = monitor();
    let auth = AuthState::new();
    let watcher = monitor.follow_auth(&auth);

    auth.login(AuthSession::new(
        "token-1",
        UserInfo {
            id: "1".into(),
            email: "ada@example.com".into(),
            name: None,
            role: UserRole::User,
        },
    ));
    let server = timeout(Duration::from_secs(2), accept(&mut accepted))
        .await
        .expect("monitor connects on login");
    let pusher = tokio::spawn(async move {
        while server.push_status(&status(ServiceStatus::Healthy, 3)) {
            tokio::task::yield_now().await;
        }
    });
    until(|| monitor.status().is_some()).await;

    auth.logout();
    until(|| !monitor.is_running()).await;
    until(|| monitor.status().is_none()).await;
    sleep(Duration::from_millis(20)).await;
    assert_eq!(monitor.status(), None);

    pusher.abort();
    watcher.abort();
}
