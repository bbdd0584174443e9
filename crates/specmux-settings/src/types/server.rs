//! Server and logging settings.

use serde::{Deserialize, Serialize};
use specmux_core::LogLevel;

/// Socket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket listening port.
    pub port: u16,
    /// Reactor poll timeout in milliseconds.
    pub poll_timeout_ms: u64,
    /// Maximum queued outbound messages per connection (0 = unlimited).
    pub max_queue_depth: usize,
    /// Bytes a connection may hold unflushed before sends are refused.
    pub max_write_buffer_bytes: usize,
    /// Port for the Prometheus scrape endpoint. Disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9002,
            poll_timeout_ms: 50,
            max_queue_depth: 0,
            max_write_buffer_bytes: 4 * 1024 * 1024,
            metrics_port: None,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Numeric verbosity (0 = off … 6 = errors only).
    pub level: LogLevel,
    /// Emit JSON lines on stdout.
    pub json: bool,
    /// Forward log lines to connections holding `websocket_permission`.
    pub websocket_sink: bool,
    /// Permission tag required to receive forwarded log lines.
    pub websocket_permission: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            websocket_sink: true,
            websocket_permission: "logs".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_port_omitted_when_none() {
        let value = serde_json::to_value(ServerSettings::default()).unwrap();
        assert!(value.get("metricsPort").is_none());
    }

    #[test]
    fn logging_level_is_numeric() {
        let settings: LoggingSettings = serde_json::from_str(r#"{"level": 2}"#).unwrap();
        assert_eq!(settings.level, LogLevel::Debug);
        assert!(settings.websocket_sink);
    }
}
