//! Transport abstraction
//!
//! The connection manager never talks to a socket library directly; it goes
//! through [`Transport`] / [`TransportFactory`] so the network stack can be
//! swapped by configuration (and mocked in tests). Two real transports
//! exist: a websocket channel and a long-poll fallback. Headless contexts
//! get a no-op transport instead of a conditional import.

pub mod noop;
pub mod polling;
pub mod websocket;

pub use noop::{NoopFactory, NoopTransport};
pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use fixia_common::{RealtimeConfig, RealtimeResult, TransportMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Which transport backend a handle speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    WebSocket,
    Polling,
    Noop,
}

/// Why a transport dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Underlying channel dropped mid-stream (network blip, proxy restart)
    TransportClose,
    /// I/O or protocol error on the channel
    TransportError,
    /// Server closed the connection normally
    ServerClose,
    /// We asked for the close
    ClientClose,
}

impl DisconnectReason {
    /// Whether the manager should schedule a reconnect for this reason
    ///
    /// Only infrastructure-level drops are retried. A deliberate close from
    /// either side is final until the caller asks to connect again.
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        matches!(self, Self::TransportClose | Self::TransportError)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportClose => write!(f, "transport close"),
            Self::TransportError => write!(f, "transport error"),
            Self::ServerClose => write!(f, "server close"),
            Self::ClientClose => write!(f, "client close"),
        }
    }
}

/// Events a transport emits toward the connection manager
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake completed; the channel is live
    Connected,
    /// The channel is gone
    Disconnected(DisconnectReason),
    /// Non-fatal error; recovery is driven by the disconnect path
    Error(String),
    /// Inbound application payload
    Message(serde_json::Value),
}

/// A live (or settling) realtime channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which backend this handle speaks
    fn kind(&self) -> TransportKind;

    /// Whether the channel currently reports itself connected
    fn is_connected(&self) -> bool;

    /// Send an application payload
    async fn send(&self, message: serde_json::Value) -> RealtimeResult<()>;

    /// Close the channel; idempotent
    async fn close(&self);
}

/// Opens transports; owns the websocket-then-polling preference order
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a fresh transport, wiring its events into `events`
    async fn open(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> RealtimeResult<Arc<dyn Transport>>;
}

/// Production factory: websocket first, long-poll fallback
pub struct NetworkFactory {
    config: RealtimeConfig,
    http: reqwest::Client,
}

impl NetworkFactory {
    /// # Errors
    /// Returns `RealtimeError::Config` if the HTTP client cannot be built.
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| fixia_common::RealtimeError::Config(format!("http client: {e}")))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl TransportFactory for NetworkFactory {
    async fn open(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> RealtimeResult<Arc<dyn Transport>> {
        match WebSocketTransport::open(
            &self.config.websocket_url(),
            self.config.connect_timeout(),
            events.clone(),
        )
        .await
        {
            Ok(transport) => Ok(transport as Arc<dyn Transport>),
            Err(error) => {
                warn!(%error, "websocket transport unavailable, falling back to polling");
                let transport = PollingTransport::open(
                    self.http.clone(),
                    self.config.poll_url(),
                    self.config.connect_timeout(),
                    events,
                )
                .await?;
                Ok(transport as Arc<dyn Transport>)
            }
        }
    }
}

impl fmt::Debug for NetworkFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkFactory")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

/// Pick the factory for the configured transport mode
///
/// # Errors
/// Returns `RealtimeError::Config` if the network factory cannot be built.
pub fn transport_factory(config: &RealtimeConfig) -> RealtimeResult<Arc<dyn TransportFactory>> {
    match config.transport_mode {
        TransportMode::Network => Ok(Arc::new(NetworkFactory::new(config.clone())?)),
        TransportMode::Disabled => Ok(Arc::new(NoopFactory)),
    }
}
