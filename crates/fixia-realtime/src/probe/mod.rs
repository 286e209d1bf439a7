//! Backend liveness probe
//!
//! A cheap HTTP health check performed before any transport is opened.
//! A dead backend fails the probe in bounded time, so we never pay for a
//! doomed websocket handshake.

use async_trait::async_trait;
use fixia_common::{RealtimeConfig, RealtimeError, RealtimeResult};
use reqwest::header;
use std::time::Duration;

/// Liveness check against the remote endpoint
///
/// Implemented by [`HttpProbe`] in production and by scripted probes in
/// tests. A probe must settle within its configured timeout.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Check whether the backend is reachable and healthy
    async fn check(&self) -> RealtimeResult<()>;
}

/// `GET <endpoint>/health` with a bounded client timeout; success = HTTP 2xx
pub struct HttpProbe {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Build a probe for the configured endpoint
    ///
    /// # Errors
    /// Returns `RealtimeError::Config` if the HTTP client cannot be built.
    pub fn new(config: &RealtimeConfig) -> RealtimeResult<Self> {
        let timeout = config.probe_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RealtimeError::Config(format!("failed to build probe client: {e}")))?;

        Ok(Self {
            url: config.health_url(),
            timeout,
            client,
        })
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn check(&self) -> RealtimeResult<()> {
        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RealtimeError::ProbeTimeout(self.timeout)
                } else {
                    RealtimeError::ProbeFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RealtimeError::ProbeFailed(format!(
                "health endpoint returned {status}"
            )))
        }
    }
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
