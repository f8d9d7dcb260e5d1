//! Settings types for the broadcaster, the viewer, and logging.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertlineSettings {
    pub server: ServerSettings,
    pub client: ClientSettings,
    pub logging: LoggingSettings,
}

/// Broadcast server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// WebSocket endpoint path.
    pub path: String,
    /// Synthetic generator period in milliseconds.
    pub broadcast_interval_ms: u64,
    /// Per-viewer outbound queue length.
    pub max_send_queue: usize,
    /// Ping period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A viewer silent for longer than this is reaped.
    pub client_timeout_ms: u64,
    /// Period of the dead-viewer sweep in milliseconds.
    pub cleanup_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5566,
            path: "/alerts".to_string(),
            broadcast_interval_ms: 4_000,
            max_send_queue: 256,
            heartbeat_interval_ms: 30_000,
            client_timeout_ms: 90_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl ServerSettings {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// Viewer (connection manager + store) settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Broadcast endpoint.
    pub url: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Consecutive failures after which retrying stops.
    pub max_reconnect_attempts: u32,
    /// Alerts retained by the store.
    pub store_capacity: usize,
    /// Whether the viewer generates local demo alerts.
    pub demo_enabled: bool,
    /// Demo generator period in milliseconds.
    pub demo_interval_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5566/alerts".to_string(),
            reconnect_delay_ms: 3_000,
            max_reconnect_attempts: 5,
            store_capacity: 100,
            demo_enabled: false,
            demo_interval_ms: 5_000,
        }
    }
}

impl ClientSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn demo_interval(&self) -> Duration {
        Duration::from_millis(self.demo_interval_ms)
    }
}

/// Logging output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AlertlineSettings {
    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        let c = &self.client;
        if !s.path.starts_with('/') {
            return Err(invalid(format!("server.path must start with '/': {}", s.path)));
        }
        for (name, value) in [
            ("server.broadcastIntervalMs", s.broadcast_interval_ms),
            ("server.heartbeatIntervalMs", s.heartbeat_interval_ms),
            ("server.clientTimeoutMs", s.client_timeout_ms),
            ("server.cleanupIntervalMs", s.cleanup_interval_ms),
            ("client.demoIntervalMs", c.demo_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be greater than zero")));
            }
        }
        if s.client_timeout_ms <= s.heartbeat_interval_ms {
            return Err(invalid(format!(
                "server.clientTimeoutMs ({}) must exceed server.heartbeatIntervalMs ({})",
                s.client_timeout_ms, s.heartbeat_interval_ms
            )));
        }
        if s.max_send_queue == 0 {
            return Err(invalid("server.maxSendQueue must be at least 1".into()));
        }
        if c.store_capacity == 0 {
            return Err(invalid("client.storeCapacity must be at least 1".into()));
        }
        // The connector is built without TLS.
        if !c.url.starts_with("ws://") {
            return Err(invalid(format!("client.url must be a ws:// URL: {}", c.url)));
        }
        Ok(())
    }
}

fn invalid(message: String) -> SettingsError {
    SettingsError::InvalidValue(message)
}
