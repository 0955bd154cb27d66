//! Client → server messages.

use serde::{Deserialize, Serialize};

/// Messages a client may send over an open connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Liveness probe; answered with `pong`.
    Ping {
        /// Client clock, echoed back in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Request the full dashboard snapshot.
    GetStats {
        /// Client clock.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Request the current pending-approval count.
    GetPendingCount {
        /// Client clock.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

impl InboundMessage {
    /// Build a ping stamped with the given client time.
    pub fn ping(timestamp: i64) -> Self {
        Self::Ping {
            timestamp: Some(timestamp),
        }
    }

    /// Wire name of the message tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::GetStats { .. } => "get_stats",
            Self::GetPendingCount { .. } => "get_pending_count",
        }
    }
}
