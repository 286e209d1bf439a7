//! No-op transport for headless contexts
//!
//! Selected with `FIXIA_TRANSPORT=disabled`. Connects instantly, drops
//! sends, never emits a disconnect. Callers run the exact same code path
//! as with a real transport, which keeps the manager testable in contexts
//! where a realtime channel is meaningless (CI, one-shot jobs).

use super::{Transport, TransportEvent, TransportFactory, TransportKind};
use async_trait::async_trait;
use fixia_common::RealtimeResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Transport that accepts everything and delivers nothing
#[derive(Debug, Default)]
pub struct NoopTransport {
    closed: AtomicBool,
}

#[async_trait]
impl Transport for NoopTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Noop
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn send(&self, message: serde_json::Value) -> RealtimeResult<()> {
        trace!(?message, "noop transport dropping outbound payload");
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory for [`NoopTransport`]
#[derive(Debug, Default)]
pub struct NoopFactory;

#[async_trait]
impl TransportFactory for NoopFactory {
    async fn open(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> RealtimeResult<Arc<dyn Transport>> {
        let _ = events.send(TransportEvent::Connected).await;
        Ok(Arc::new(NoopTransport::default()))
    }
}
