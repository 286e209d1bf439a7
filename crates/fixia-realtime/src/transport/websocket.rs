//! WebSocket transport
//!
//! Preferred channel. The handshake is bounded by the configured connect
//! timeout; after that a reader and a writer task own the two halves of the
//! stream. The library never reconnects on its own -- drops surface as a
//! single `Disconnected` event and the connection manager decides what to
//! do with it.

use super::{DisconnectReason, Transport, TransportEvent, TransportKind};
use async_trait::async_trait;
use fixia_common::{RealtimeError, RealtimeResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live websocket channel
pub struct WebSocketTransport {
    session_id: String,
    connected: Arc<AtomicBool>,
    closed_by_client: Arc<AtomicBool>,
    outbound: mpsc::Sender<Message>,
}

impl WebSocketTransport {
    /// Dial `url` and start the reader/writer tasks
    ///
    /// Emits `TransportEvent::Connected` once the handshake settles.
    ///
    /// # Errors
    /// - `HandshakeTimeout` if the handshake exceeds `connect_timeout`
    /// - `Transport` for any handshake failure
    pub async fn open(
        url: &str,
        connect_timeout: Duration,
        events: mpsc::Sender<TransportEvent>,
    ) -> RealtimeResult<Arc<Self>> {
        let (stream, _response) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| RealtimeError::HandshakeTimeout(connect_timeout))?
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        let session_id = Uuid::new_v4().to_string();
        debug!(session_id = %session_id, url, "websocket handshake complete");

        let (sink, source) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(64);
        let connected = Arc::new(AtomicBool::new(true));
        let closed_by_client = Arc::new(AtomicBool::new(false));

        let transport = Arc::new(Self {
            session_id: session_id.clone(),
            connected: connected.clone(),
            closed_by_client: closed_by_client.clone(),
            outbound: outbound_tx.clone(),
        });

        // Queue Connected before the read loop starts so no disconnect can
        // ever be observed ahead of it.
        let _ = events.send(TransportEvent::Connected).await;

        tokio::spawn(write_loop(sink, outbound_rx));
        tokio::spawn(read_loop(
            source,
            outbound_tx,
            events,
            connected,
            closed_by_client,
            session_id,
        ));

        Ok(transport)
    }

    /// Session id used for log correlation
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: serde_json::Value) -> RealtimeResult<()> {
        if !self.is_connected() {
            return Err(RealtimeError::NotConnected);
        }

        let text =
            serde_json::to_string(&message).map_err(|e| RealtimeError::Transport(e.to_string()))?;

        self.outbound
            .send(Message::Text(text))
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }

    async fn close(&self) {
        if self.closed_by_client.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Message::Close(None)).await;
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn write_loop(mut sink: SplitSink<WsStream, Message>, mut outbound: mpsc::Receiver<Message>) {
    while let Some(message) = outbound.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut source: SplitStream<WsStream>,
    outbound: mpsc::Sender<Message>,
    events: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    closed_by_client: Arc<AtomicBool>,
    session_id: String,
) {
    // A stream that ends without a close frame counts as an infrastructure
    // drop, not a deliberate shutdown.
    let mut reason = DisconnectReason::TransportClose;

    while let Some(item) = source.next().await {
        match item {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(value) => {
                    if events.send(TransportEvent::Message(value)).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(session_id = %session_id, %error, "dropping non-JSON text frame");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(frame)) => {
                reason = classify_close(frame.as_ref());
                break;
            }
            Ok(other) => {
                trace!(session_id = %session_id, "ignoring frame: {other:?}");
            }
            Err(error) => {
                let _ = events.send(TransportEvent::Error(error.to_string())).await;
                reason = DisconnectReason::TransportError;
                break;
            }
        }
    }

    if closed_by_client.load(Ordering::SeqCst) {
        reason = DisconnectReason::ClientClose;
    }
    connected.store(false, Ordering::SeqCst);

    debug!(session_id = %session_id, %reason, "websocket read loop ended");
    let _ = events.send(TransportEvent::Disconnected(reason)).await;
}

/// Map a close frame to a disconnect reason
///
/// Only a normal close (1000) counts as the server deliberately ending the
/// session. Going-away, abnormal codes and frameless closes all look like
/// infrastructure drops to us and stay retryable.
fn classify_close(frame: Option<&CloseFrame<'_>>) -> DisconnectReason {
    match frame {
        Some(frame) if frame.code == CloseCode::Normal => DisconnectReason::ServerClose,
        _ => DisconnectReason::TransportClose,
    }
}
