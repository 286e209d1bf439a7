//! Test helpers for integration tests
//!
//! Provides a mock Fixia backend with a controllable `/health` endpoint and
//! a `/realtime` websocket route, plus small polling utilities.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fixia_common::{RealtimeConfig, TransportMode};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Shared, test-controllable backend behavior
pub struct BackendState {
    /// Status `/health` answers with
    health_status: AtomicU16,
    /// Websocket connections accepted so far
    connection_count: AtomicUsize,
    /// Payload pushed to every new websocket connection
    greeting: Mutex<Option<serde_json::Value>>,
    /// If set, the next accepted connection is closed with this code
    /// (consumed once; later connections stay open)
    close_next_with: Mutex<Option<u16>>,
    /// Pending payloads for the long-poll endpoint; drained per round
    poll_queue: Mutex<Vec<serde_json::Value>>,
}

impl BackendState {
    pub fn set_health_status(&self, status: u16) {
        self.health_status.store(status, Ordering::SeqCst);
    }

    pub fn set_greeting(&self, payload: serde_json::Value) {
        *self.greeting.lock() = Some(payload);
    }

    /// Close the next accepted websocket with `code` right after the greeting
    pub fn close_next_connection_with(&self, code: u16) {
        *self.close_next_with.lock() = Some(code);
    }

    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Queue a payload for delivery over the long-poll endpoint
    pub fn push_poll_message(&self, payload: serde_json::Value) {
        self.poll_queue.lock().push(payload);
    }
}

/// Mock backend instance that manages lifecycle
pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
    _handle: JoinHandle<()>,
}

impl MockBackend {
    /// Start a healthy backend on an ephemeral port
    pub async fn start() -> Result<Self> {
        let state = Arc::new(BackendState {
            health_status: AtomicU16::new(200),
            connection_count: AtomicUsize::new(0),
            greeting: Mutex::new(None),
            close_next_with: Mutex::new(None),
            poll_queue: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/realtime", get(ws_handler))
            .route("/realtime/poll", get(poll_handler).post(poll_send_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Realtime config pointing at this backend, with fast retry timings
    /// so tests settle quickly
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            endpoint: self.endpoint(),
            health_path: "/health".to_string(),
            websocket_path: "/realtime".to_string(),
            poll_path: "/realtime/poll".to_string(),
            probe_timeout_ms: 1_000,
            connect_timeout_ms: 2_000,
            max_reconnect_attempts: 5,
            backoff_base_ms: 50,
            backoff_factor: 2.0,
            backoff_max_ms: 200,
            transport_mode: TransportMode::Network,
        }
    }
}

async fn health_handler(State(state): State<Arc<BackendState>>) -> Response {
    let status = StatusCode::from_u16(state.health_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "{\"status\":\"ok\"}").into_response()
}

async fn poll_handler(State(state): State<Arc<BackendState>>) -> Json<Vec<serde_json::Value>> {
    let batch = std::mem::take(&mut *state.poll_queue.lock());
    Json(batch)
}

/// Sends over the polling transport come back on the next poll round,
/// mirroring the websocket echo behavior
async fn poll_send_handler(
    State(state): State<Arc<BackendState>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    state.poll_queue.lock().push(payload);
    StatusCode::OK
}

async fn ws_handler(State(state): State<Arc<BackendState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<BackendState>) {
    state.connection_count.fetch_add(1, Ordering::SeqCst);

    let greeting = state.greeting.lock().clone();
    if let Some(payload) = greeting {
        if socket.send(Message::Text(payload.to_string())).await.is_err() {
            return;
        }
    }

    let close_next_with = state.close_next_with.lock().take();
    if let Some(code) = close_next_with {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "test close".into(),
            })))
            .await;
        return;
    }

    // Echo everything until the client goes away
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(text) = message {
            if socket.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
