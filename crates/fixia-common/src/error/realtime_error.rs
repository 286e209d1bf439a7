//! Realtime connection error types
//!
//! None of these are fatal to the host process; every failure path in the
//! connection manager degrades to "not connected".

use std::time::Duration;

/// Errors produced by the realtime connection stack
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    // Liveness probe errors
    #[error("Liveness probe failed: {0}")]
    ProbeFailed(String),

    #[error("Liveness probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Transport is not connected")]
    NotConnected,

    // Retry policy
    #[error("Reconnect attempts exhausted after {0} tries")]
    RetryExhausted(u32),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl RealtimeError {
    /// Whether this error came from the liveness probe rather than the
    /// transport itself. Probe failures fail fast and are never retried
    /// inline by `connect()`.
    #[must_use]
    pub const fn is_probe_failure(&self) -> bool {
        matches!(self, Self::ProbeFailed(_) | Self::ProbeTimeout(_))
    }
}

/// Convenience result alias
pub type RealtimeResult<T> = Result<T, RealtimeError>;
