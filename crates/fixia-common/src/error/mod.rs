//! Error types

mod realtime_error;

pub use realtime_error::{RealtimeError, RealtimeResult};
