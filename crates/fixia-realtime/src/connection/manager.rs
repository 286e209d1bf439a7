//! Connection manager
//!
//! Owns at most one live transport. Connect attempts are gated behind the
//! liveness probe; drops after a successful connect are retried with capped
//! exponential backoff. Retry policy lives here, never in the transport.
//!
//! Probe failures on a caller-initiated `connect()` fail fast without any
//! internal retry: a cold probe failure usually means the backend is down
//! entirely. Failures during a *scheduled* reconnect count as failed
//! retries and keep backing off until the cap -- a drop after a successful
//! connect usually means a transient blip worth retrying.

use crate::backoff::BackoffPolicy;
use crate::probe::{HttpProbe, LivenessProbe};
use crate::transport::{transport_factory, Transport, TransportEvent, TransportFactory};
use fixia_common::{RealtimeConfig, RealtimeError, RealtimeResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use super::ConnectionState;

/// Buffer for inbound message fan-out; slow subscribers lag, they do not
/// block the transport
const MESSAGE_BUFFER: usize = 256;

/// Buffer for the per-transport event channel
const EVENT_BUFFER: usize = 64;

/// Manages the single realtime connection session
///
/// Cheap to clone through `Arc`; all methods take `&self`. Construct one
/// per endpoint and hand it to whichever component needs realtime
/// connectivity -- there is no global instance.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    policy: BackoffPolicy,
    max_reconnect_attempts: u32,
    probe: Arc<dyn LivenessProbe>,
    factory: Arc<dyn TransportFactory>,
    messages: broadcast::Sender<serde_json::Value>,
    inner: Mutex<Inner>,
}

/// The connection session record (one per manager)
struct Inner {
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    reconnect_attempts: u32,
    connecting: bool,
    /// Generation counter. `disconnect()` bumps it; stale reconnect timers
    /// and events from torn-down transports compare against it and bail.
    epoch: u64,
}

impl ConnectionManager {
    /// Create a manager with injected probe and transport factory
    pub fn new(
        config: &RealtimeConfig,
        probe: Arc<dyn LivenessProbe>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self::with_policy(
            BackoffPolicy::from_config(config),
            config.max_reconnect_attempts,
            probe,
            factory,
        )
    }

    /// Create a manager with an explicit backoff policy
    pub fn with_policy(
        policy: BackoffPolicy,
        max_reconnect_attempts: u32,
        probe: Arc<dyn LivenessProbe>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_BUFFER);
        Self {
            shared: Arc::new(Shared {
                policy,
                max_reconnect_attempts,
                probe,
                factory,
                messages,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    transport: None,
                    reconnect_attempts: 0,
                    connecting: false,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Wire up the production probe and transport for the configured mode
    ///
    /// # Errors
    /// Returns `RealtimeError::Config` if the HTTP clients cannot be built.
    pub fn from_config(config: &RealtimeConfig) -> RealtimeResult<Self> {
        let probe = Arc::new(HttpProbe::new(config)?);
        let factory = transport_factory(config)?;
        Ok(Self::new(config, probe, factory))
    }

    /// Connect, or return the existing/in-flight connection
    ///
    /// Idempotent while connected. While an attempt is in flight the call
    /// returns the pending handle (possibly `None`) without starting a
    /// second attempt. A probe failure aborts the attempt and returns
    /// `None` -- it is logged, not raised.
    pub async fn connect(&self) -> Option<Arc<dyn Transport>> {
        let epoch = {
            let mut inner = self.shared.inner.lock();
            if let Some(transport) = inner.transport.as_ref() {
                if transport.is_connected() {
                    return Some(transport.clone());
                }
            }
            if inner.connecting {
                return inner.transport.clone();
            }
            inner.connecting = true;
            inner.state = ConnectionState::Probing;
            inner.epoch
        };

        match Shared::try_establish(&self.shared, epoch).await {
            Ok(transport) => Some(transport),
            Err(error) => {
                warn!(%error, "connect attempt failed");
                let mut inner = self.shared.inner.lock();
                if inner.epoch == epoch {
                    inner.connecting = false;
                    // Fast-fail policy: a failed probe leaves us exactly
                    // where we started. Anything past the probe counts as
                    // a real failed attempt.
                    inner.state = if error.is_probe_failure() {
                        ConnectionState::Idle
                    } else {
                        ConnectionState::Disconnected
                    };
                }
                None
            }
        }
    }

    /// Tear the session down; idempotent, always succeeds
    pub async fn disconnect(&self) {
        let transport = {
            let mut inner = self.shared.inner.lock();
            inner.epoch += 1;
            inner.reconnect_attempts = 0;
            inner.connecting = false;
            inner.state = ConnectionState::Idle;
            inner.transport.take()
        };

        if let Some(transport) = transport {
            transport.close().await;
            info!("realtime connection closed");
        }
    }

    /// Whether a live transport exists right now; never panics
    #[must_use]
    pub fn is_connected(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner.state == ConnectionState::Connected
            && inner.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    /// Current transport handle, if any; pure accessor
    #[must_use]
    pub fn get_connection(&self) -> Option<Arc<dyn Transport>> {
        self.shared.inner.lock().transport.clone()
    }

    /// Current state machine position
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Consecutive failed reconnect attempts since the last success
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect_attempts
    }

    /// Subscribe to inbound messages from the transport
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.shared.messages.subscribe()
    }
}

impl Shared {
    /// Probe, open a transport, register it. Shared by `connect()` and the
    /// reconnect timer; the caller decides what a failure means.
    async fn try_establish(
        shared: &Arc<Shared>,
        epoch: u64,
    ) -> RealtimeResult<Arc<dyn Transport>> {
        shared.probe.check().await?;

        // disconnect() may have raced the probe
        if shared.inner.lock().epoch != epoch {
            return Err(RealtimeError::NotConnected);
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let transport = shared.factory.open(events_tx).await?;

        {
            let mut inner = shared.inner.lock();
            if inner.epoch != epoch {
                // torn down while the handshake ran; drop the fresh transport
                let transport = transport.clone();
                tokio::spawn(async move { transport.close().await });
                return Err(RealtimeError::NotConnected);
            }
            inner.transport = Some(transport.clone());
            inner.state = ConnectionState::Connecting;
        }

        Shared::spawn_event_pump(shared.clone(), epoch, events_rx);
        Ok(transport)
    }

    fn spawn_event_pump(
        shared: Arc<Shared>,
        epoch: u64,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                Shared::handle_event(&shared, epoch, event);
            }
        });
    }

    /// Apply one transport event to the state machine
    fn handle_event(shared: &Arc<Shared>, epoch: u64, event: TransportEvent) {
        let mut inner = shared.inner.lock();
        if inner.epoch != epoch {
            return;
        }

        match event {
            TransportEvent::Message(payload) => {
                // fan-out happens outside the session lock; no subscribers
                // is fine
                drop(inner);
                let _ = shared.messages.send(payload);
            }
            TransportEvent::Connected => {
                inner.reconnect_attempts = 0;
                inner.connecting = false;
                inner.state = ConnectionState::Connected;
                info!("realtime transport connected");
            }
            TransportEvent::Disconnected(reason) => {
                inner.transport = None;
                inner.connecting = false;
                if inner.state == ConnectionState::Connected && reason.should_reconnect() {
                    info!(%reason, "realtime transport dropped");
                    Shared::schedule_reconnect(shared, &mut inner);
                } else {
                    info!(%reason, "realtime transport disconnected");
                    inner.state = ConnectionState::Disconnected;
                }
            }
            TransportEvent::Error(message) => {
                if inner.state == ConnectionState::Connecting {
                    // handshake-level error; no automatic retry from error alone
                    inner.transport = None;
                    inner.connecting = false;
                    inner.state = ConnectionState::Disconnected;
                    warn!(error = %message, "transport error while connecting");
                } else {
                    warn!(error = %message, "transport error");
                }
            }
        }
    }

    /// Schedule the next reconnect attempt, or give up at the cap
    ///
    /// Fail-stop by design: once the cap is hit the manager settles in
    /// `Disconnected` and waits for an explicit `connect()`.
    fn schedule_reconnect(shared: &Arc<Shared>, inner: &mut Inner) {
        if inner.reconnect_attempts >= shared.max_reconnect_attempts {
            inner.state = ConnectionState::Disconnected;
            let exhausted = RealtimeError::RetryExhausted(inner.reconnect_attempts);
            error!(error = %exhausted, "giving up on reconnection");
            return;
        }

        inner.reconnect_attempts += 1;
        let attempt = inner.reconnect_attempts;
        let delay = shared.policy.delay_for(attempt);
        inner.state = ConnectionState::ReconnectScheduled;
        let epoch = inner.epoch;

        info!(
            attempt,
            max = shared.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );

        let shared = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut inner = shared.inner.lock();
                // disconnect() or a caller-initiated connect() while we
                // slept makes this timer stale
                if inner.epoch != epoch || inner.state != ConnectionState::ReconnectScheduled {
                    return;
                }
                inner.connecting = true;
                inner.state = ConnectionState::Probing;
            }

            if let Err(error) = Shared::try_establish(&shared, epoch).await {
                warn!(%error, attempt, "reconnect attempt failed");
                let mut inner = shared.inner.lock();
                if inner.epoch == epoch {
                    inner.connecting = false;
                    Shared::schedule_reconnect(&shared, &mut inner);
                }
            }
        });
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &inner.state)
            .field("reconnect_attempts", &inner.reconnect_attempts)
            .field("connecting", &inner.connecting)
            .finish()
    }
}
