//! End-to-end tests: real manager, real websocket, mock backend

use std::sync::Arc;
use std::time::Duration;

use fixia_realtime::{
    ConnectionManager, ConnectionState, HttpProbe, LivenessProbe, TransportKind,
};
use integration_tests::{wait_for, MockBackend};

const SETTLE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn unhealthy_backend_blocks_connect() {
    let backend = MockBackend::start().await.unwrap();
    backend.state.set_health_status(503);

    let manager = ConnectionManager::from_config(&backend.realtime_config()).unwrap();

    assert!(manager.connect().await.is_none());
    assert!(!manager.is_connected());
    assert_eq!(manager.state(), ConnectionState::Idle);
    assert_eq!(backend.state.connection_count(), 0);
}

#[tokio::test]
async fn connects_and_receives_greeting() {
    let backend = MockBackend::start().await.unwrap();
    let greeting = serde_json::json!({"event": "service:matched", "service_id": 7});
    backend.state.set_greeting(greeting.clone());

    let manager = ConnectionManager::from_config(&backend.realtime_config()).unwrap();
    let mut messages = manager.subscribe();

    let handle = manager.connect().await.expect("connect returned no handle");
    assert_eq!(handle.kind(), TransportKind::WebSocket);

    let connected = wait_for(|| manager.is_connected(), SETTLE).await;
    assert!(connected, "manager never reported connected");
    assert_eq!(manager.reconnect_attempts(), 0);

    let received = tokio::time::timeout(SETTLE, messages.recv())
        .await
        .expect("no greeting within timeout")
        .expect("message channel closed");
    assert_eq!(received, greeting);
}

#[tokio::test]
async fn echo_roundtrip_through_transport() {
    let backend = MockBackend::start().await.unwrap();

    let manager = ConnectionManager::from_config(&backend.realtime_config()).unwrap();
    let mut messages = manager.subscribe();

    manager.connect().await.expect("connect returned no handle");
    assert!(wait_for(|| manager.is_connected(), SETTLE).await);

    let payload = serde_json::json!({"event": "proposal:sent", "professional_id": 12});
    let transport = manager.get_connection().expect("no live transport");
    transport.send(payload.clone()).await.unwrap();

    let echoed = tokio::time::timeout(SETTLE, messages.recv())
        .await
        .expect("no echo within timeout")
        .expect("message channel closed");
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn disconnect_tears_the_session_down() {
    let backend = MockBackend::start().await.unwrap();

    let manager = ConnectionManager::from_config(&backend.realtime_config()).unwrap();
    manager.connect().await.expect("connect returned no handle");
    assert!(wait_for(|| manager.is_connected(), SETTLE).await);

    manager.disconnect().await;
    assert!(!manager.is_connected());
    assert_eq!(manager.state(), ConnectionState::Idle);
    assert!(manager.get_connection().is_none());

    // idempotent
    manager.disconnect().await;
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn reconnects_after_abnormal_close() {
    let backend = MockBackend::start().await.unwrap();
    // going-away: infrastructure-style drop, retryable
    backend.state.close_next_connection_with(1001);

    let manager = ConnectionManager::from_config(&backend.realtime_config()).unwrap();
    manager.connect().await.expect("connect returned no handle");

    let reconnected = wait_for(
        || backend.state.connection_count() >= 2 && manager.is_connected(),
        SETTLE,
    )
    .await;
    assert!(reconnected, "manager never re-established the session");
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn normal_server_close_is_terminal() {
    let backend = MockBackend::start().await.unwrap();
    backend.state.close_next_connection_with(1000);

    let manager = ConnectionManager::from_config(&backend.realtime_config()).unwrap();
    manager.connect().await.expect("connect returned no handle");

    let settled = wait_for(|| manager.state() == ConnectionState::Disconnected, SETTLE).await;
    assert!(settled, "manager never settled in disconnected");

    // give any (incorrect) retry timer a chance to fire
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.state.connection_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn http_probe_honors_health_status() {
    let backend = MockBackend::start().await.unwrap();
    let probe = HttpProbe::new(&backend.realtime_config()).unwrap();

    assert!(probe.check().await.is_ok());

    backend.state.set_health_status(500);
    let error = probe.check().await.unwrap_err();
    assert!(error.is_probe_failure());
}

#[tokio::test]
async fn falls_back_to_polling_when_websocket_unavailable() {
    let backend = MockBackend::start().await.unwrap();
    let mut config = backend.realtime_config();
    // point the websocket at a route that does not exist; the handshake
    // fails and the manager should come up on the poll endpoint instead
    config.websocket_path = "/nowhere".to_string();

    let pending = serde_json::json!({"event": "chat:message", "body": "hola"});
    backend.state.push_poll_message(pending.clone());

    let manager = ConnectionManager::from_config(&config).unwrap();
    let mut messages = manager.subscribe();

    let handle = manager.connect().await.expect("connect returned no handle");
    assert_eq!(handle.kind(), TransportKind::Polling);
    assert!(wait_for(|| manager.is_connected(), SETTLE).await);

    let received = tokio::time::timeout(SETTLE, messages.recv())
        .await
        .expect("no poll delivery within timeout")
        .expect("message channel closed");
    assert_eq!(received, pending);

    // sends go out as POSTs and echo back on the next round
    let payload = serde_json::json!({"event": "booking:confirmed", "booking_id": 3});
    handle.send(payload.clone()).await.unwrap();
    let echoed = tokio::time::timeout(SETTLE, messages.recv())
        .await
        .expect("no echo within timeout")
        .expect("message channel closed");
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn overlapping_connects_share_one_session() {
    let backend = MockBackend::start().await.unwrap();

    let manager = ConnectionManager::from_config(&backend.realtime_config()).unwrap();

    let mut calls = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        calls.push(tokio::spawn(async move { manager.connect().await }));
    }
    let handles: Vec<_> = futures_join(calls).await;

    assert!(wait_for(|| manager.is_connected(), SETTLE).await);
    assert_eq!(backend.state.connection_count(), 1);
    // at least the winning call got a handle
    assert!(handles.iter().any(Option::is_some));
}

/// Await a batch of join handles, panicking on any task failure
async fn futures_join(
    calls: Vec<tokio::task::JoinHandle<Option<Arc<dyn fixia_realtime::Transport>>>>,
) -> Vec<Option<Arc<dyn fixia_realtime::Transport>>> {
    let mut out = Vec::with_capacity(calls.len());
    for call in calls {
        out.push(call.await.expect("connect task panicked"));
    }
    out
}
