//! Connection state machine states

use serde::{Deserialize, Serialize};

/// Where the connection session currently is
///
/// Transitions:
/// - `Idle -> Probing` on `connect()`
/// - `Probing -> Idle` on probe failure; `Probing -> Connecting` on success
/// - `Connecting -> Connected` on the transport's connect event
/// - `Connected -> ReconnectScheduled` on a retryable drop
/// - `Connected -> Disconnected` on a terminal drop
/// - `ReconnectScheduled -> Probing` when the timer fires under the cap
/// - `ReconnectScheduled -> Disconnected` once the cap is hit
/// - any state `-> Idle` on `disconnect()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session; nothing scheduled
    Idle,
    /// Liveness probe in flight
    Probing,
    /// Probe passed, transport handshake settling
    Connecting,
    /// Transport is live
    Connected,
    /// Waiting out the backoff delay before the next attempt
    ReconnectScheduled,
    /// Gave up (terminal drop or retries exhausted); only an explicit
    /// `connect()` leaves this state
    Disconnected,
}

impl ConnectionState {
    /// Whether a connect attempt is currently in flight
    #[must_use]
    pub const fn is_attempting(self) -> bool {
        matches!(self, Self::Probing | Self::Connecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Probing => write!(f, "probing"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::ReconnectScheduled => write!(f, "reconnect-scheduled"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}
