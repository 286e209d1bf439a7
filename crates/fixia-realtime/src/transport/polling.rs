//! Long-poll fallback transport
//!
//! Used when the websocket handshake fails (restrictive proxies mostly).
//! Each poll round is a `GET <endpoint>/realtime/poll` returning a JSON
//! array of pending payloads; sends go out as individual POSTs. Slower and
//! chattier than the websocket, but survives middleboxes that websockets
//! do not.

use super::{DisconnectReason, Transport, TransportEvent, TransportKind};
use async_trait::async_trait;
use fixia_common::{RealtimeError, RealtimeResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Consecutive failed poll rounds before the transport gives up
const MAX_POLL_FAILURES: u32 = 3;

/// Pause between poll rounds; the server holds the request open, this only
/// spaces out reconnects of the poll request itself
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// HTTP long-poll channel
pub struct PollingTransport {
    session_id: String,
    url: String,
    client: reqwest::Client,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl PollingTransport {
    /// Verify the poll endpoint answers, then start the poll loop
    ///
    /// # Errors
    /// - `HandshakeTimeout` if the initial round exceeds `connect_timeout`
    /// - `Transport` if the endpoint is unreachable or non-2xx
    pub async fn open(
        client: reqwest::Client,
        url: String,
        connect_timeout: Duration,
        events: mpsc::Sender<TransportEvent>,
    ) -> RealtimeResult<Arc<Self>> {
        // One bounded round up front so a dead poll endpoint fails the
        // connect attempt instead of the first background round.
        let response = timeout(connect_timeout, client.get(&url).send())
            .await
            .map_err(|_| RealtimeError::HandshakeTimeout(connect_timeout))?
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RealtimeError::Transport(format!(
                "poll endpoint returned {}",
                response.status()
            )));
        }

        let session_id = Uuid::new_v4().to_string();
        debug!(session_id = %session_id, url = %url, "polling transport established");

        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());

        let transport = Arc::new(Self {
            session_id: session_id.clone(),
            url: url.clone(),
            client: client.clone(),
            connected: connected.clone(),
            shutdown: shutdown.clone(),
        });

        // Deliver whatever the verification round returned before the loop
        // takes over.
        let initial: Vec<serde_json::Value> = response.json().await.unwrap_or_default();

        // Queue Connected before the poll loop starts so no disconnect can
        // ever be observed ahead of it.
        let _ = events.send(TransportEvent::Connected).await;

        tokio::spawn(poll_loop(
            client, url, events, connected, shutdown, session_id, initial,
        ));

        Ok(transport)
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: serde_json::Value) -> RealtimeResult<()> {
        if !self.is_connected() {
            return Err(RealtimeError::NotConnected);
        }

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RealtimeError::Transport(format!(
                "poll send returned {}",
                response.status()
            )))
        }
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

impl std::fmt::Debug for PollingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingTransport")
            .field("session_id", &self.session_id)
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn poll_loop(
    client: reqwest::Client,
    url: String,
    events: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    session_id: String,
    initial: Vec<serde_json::Value>,
) {
    for payload in initial {
        if events.send(TransportEvent::Message(payload)).await.is_err() {
            return;
        }
    }

    let mut failures: u32 = 0;
    let reason = loop {
        tokio::select! {
            () = shutdown.notified() => break DisconnectReason::ClientClose,
            result = client.get(&url).send() => match result {
                Ok(response) if response.status().is_success() => {
                    failures = 0;
                    let batch: Vec<serde_json::Value> = response.json().await.unwrap_or_default();
                    for payload in batch {
                        if events.send(TransportEvent::Message(payload)).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(response) => {
                    failures += 1;
                    warn!(
                        session_id = %session_id,
                        status = %response.status(),
                        failures,
                        "poll round rejected"
                    );
                }
                Err(error) => {
                    failures += 1;
                    let _ = events.send(TransportEvent::Error(error.to_string())).await;
                }
            }
        }

        if failures >= MAX_POLL_FAILURES {
            break DisconnectReason::TransportError;
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    };

    connected.store(false, Ordering::SeqCst);
    debug!(session_id = %session_id, %reason, "poll loop ended");
    let _ = events.send(TransportEvent::Disconnected(reason)).await;
}
