//! # fixia-realtime
//!
//! Client-side realtime connection management for the Fixia backend.
//!
//! A [`ConnectionManager`] owns at most one live transport connection. Every
//! connect attempt is gated behind an HTTP liveness probe, and drops after a
//! successful connect are retried with capped exponential backoff. Retry
//! policy lives entirely in this crate; the transport library's own
//! reconnection is never used.

pub mod backoff;
pub mod connection;
pub mod probe;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use connection::{ConnectionManager, ConnectionState};
pub use probe::{HttpProbe, LivenessProbe};
pub use transport::{
    transport_factory, DisconnectReason, NetworkFactory, NoopFactory, Transport, TransportEvent,
    TransportFactory, TransportKind,
};
