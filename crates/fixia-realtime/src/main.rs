//! Realtime watcher entry point
//!
//! Connects to the configured backend and logs inbound realtime events
//! until interrupted. Run with:
//! ```bash
//! FIXIA_ENDPOINT=https://api.fixia.app cargo run -p fixia-realtime
//! ```
//!
//! Configuration is loaded from environment variables.

use fixia_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use fixia_realtime::ConnectionManager;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Realtime watcher failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let tracing_config = if config.app.env.is_production() {
        TracingConfig::production()
    } else {
        TracingConfig::development()
    };
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        endpoint = %config.realtime.endpoint,
        transport = ?config.realtime.transport_mode,
        "Starting realtime watcher"
    );

    let manager = ConnectionManager::from_config(&config.realtime)?;
    let mut messages = manager.subscribe();

    if manager.connect().await.is_none() {
        warn!("Backend not reachable; will stay idle until it comes back");
    }

    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Ok(payload) => info!(%payload, "realtime event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dropped realtime events, consumer too slow");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    manager.disconnect().await;
    Ok(())
}
