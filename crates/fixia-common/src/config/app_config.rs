//! Application configuration structs
//!
//! Loads configuration from environment variables (with `.env` support).

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub realtime: RealtimeConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Which transport backend the connection manager should use
///
/// `Disabled` is for headless contexts (cron jobs, CI) where opening a
/// realtime channel makes no sense; callers still get a connected no-op
/// handle so the rest of the code path is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Network,
    Disabled,
}

/// Realtime connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Base URL of the backend, e.g. `https://api.fixia.app`
    pub endpoint: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_websocket_path")]
    pub websocket_path: String,
    #[serde(default = "default_poll_path")]
    pub poll_path: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default)]
    pub transport_mode: TransportMode,
}

impl RealtimeConfig {
    /// URL of the liveness probe endpoint
    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), self.health_path)
    }

    /// URL of the websocket endpoint, with the scheme rewritten to ws/wss
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}{}", self.websocket_path)
    }

    /// URL of the long-poll fallback endpoint
    #[must_use]
    pub fn poll_url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), self.poll_path)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// Default value functions
fn default_app_name() -> String {
    "fixia-realtime".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_websocket_path() -> String {
    "/realtime".to_string()
}

fn default_poll_path() -> String {
    "/realtime/poll".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            realtime: RealtimeConfig {
                endpoint: env::var("FIXIA_ENDPOINT")
                    .map_err(|_| ConfigError::MissingVar("FIXIA_ENDPOINT"))?,
                health_path: env::var("FIXIA_HEALTH_PATH")
                    .unwrap_or_else(|_| default_health_path()),
                websocket_path: env::var("FIXIA_WEBSOCKET_PATH")
                    .unwrap_or_else(|_| default_websocket_path()),
                poll_path: env::var("FIXIA_POLL_PATH").unwrap_or_else(|_| default_poll_path()),
                probe_timeout_ms: env::var("FIXIA_PROBE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_probe_timeout_ms),
                connect_timeout_ms: env::var("FIXIA_CONNECT_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_connect_timeout_ms),
                max_reconnect_attempts: env::var("FIXIA_MAX_RECONNECT_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_max_reconnect_attempts),
                backoff_base_ms: env::var("FIXIA_BACKOFF_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_backoff_base_ms),
                backoff_factor: env::var("FIXIA_BACKOFF_FACTOR")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_backoff_factor),
                backoff_max_ms: env::var("FIXIA_BACKOFF_MAX_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_backoff_max_ms),
                transport_mode: env::var("FIXIA_TRANSPORT")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "network" => Some(TransportMode::Network),
                        "disabled" => Some(TransportMode::Disabled),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
