//! Connection lifecycle
//!
//! [`ConnectionManager`] owns the single realtime session: probe, connect,
//! watch, retry. [`ConnectionState`] is the explicit state machine it moves
//! through.

mod manager;
mod state;

pub use manager::ConnectionManager;
pub use state::ConnectionState;
