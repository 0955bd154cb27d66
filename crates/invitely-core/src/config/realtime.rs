//! Real-time WebSocket engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::protocol::validate_group_name;

/// How presence is counted when one administrator has several tabs open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceMode {
    /// `admin_joined` / `admin_left` fire on a principal's first and last
    /// connection in a group.
    #[default]
    PerPrincipal,
    /// Every connection joining or leaving produces a presence message.
    PerConnection,
}

/// Real-time (WebSocket) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Heartbeat supervision tick, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Silence after which a connection is considered dead, in seconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
    /// Per-connection outbound queue capacity. A client that fills it is disconnected.
    #[serde(default = "default_send_buffer")]
    pub send_buffer_size: usize,
    /// Capacity of each in-memory bus topic.
    #[serde(default = "default_bus_buffer")]
    pub bus_buffer_size: usize,
    /// Consecutive malformed inbound messages tolerated before closing.
    #[serde(default = "default_max_parse_failures")]
    pub max_consecutive_parse_failures: u32,
    /// Largest accepted inbound text frame, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Group joined when the handshake does not name one.
    #[serde(default = "default_group")]
    pub default_group: String,
    /// Presence counting policy.
    #[serde(default)]
    pub presence_mode: PresenceMode,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
            send_buffer_size: default_send_buffer(),
            bus_buffer_size: default_bus_buffer(),
            max_consecutive_parse_failures: default_max_parse_failures(),
            max_message_bytes: default_max_message_bytes(),
            default_group: default_group(),
            presence_mode: PresenceMode::default(),
        }
    }
}

impl RealtimeConfig {
    /// Heartbeat supervision tick.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Heartbeat silence limit.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    /// Checks internal consistency of the settings.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(AppError::configuration(
                "realtime.heartbeat_interval_seconds must be greater than zero",
            ));
        }
        if self.heartbeat_timeout_seconds < self.heartbeat_interval_seconds {
            return Err(AppError::configuration(
                "realtime.heartbeat_timeout_seconds must not be shorter than the interval",
            ));
        }
        if self.send_buffer_size == 0 || self.bus_buffer_size == 0 {
            return Err(AppError::configuration(
                "realtime buffer sizes must be greater than zero",
            ));
        }
        if let Err(e) = validate_group_name(&self.default_group) {
            return Err(AppError::configuration(format!(
                "realtime.default_group '{}' is not a valid group name: {}",
                self.default_group, e.message
            )));
        }
        Ok(())
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    90
}

fn default_send_buffer() -> usize {
    256
}

fn default_bus_buffer() -> usize {
    1024
}

fn default_max_parse_failures() -> u32 {
    5
}

fn default_max_message_bytes() -> usize {
    65_536
}

fn default_group() -> String {
    "admin-dashboard".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_shorter_than_interval_rejected() {
        let config = RealtimeConfig {
            heartbeat_interval_seconds: 30,
            heartbeat_timeout_seconds: 10,
            ..RealtimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_group_must_be_a_valid_group_name() {
        assert!(RealtimeConfig::default().validate().is_ok());
        for bad in ["", "admin dashboard", "ops/alerts"] {
            let config = RealtimeConfig {
                default_group: bad.to_string(),
                ..RealtimeConfig::default()
            };
            assert!(config.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_presence_mode_parses_snake_case() {
        let mode: PresenceMode = serde_json::from_str("\"per_connection\"").unwrap();
        assert_eq!(mode, PresenceMode::PerConnection);
    }
}
