//! Outbound message type tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag of a server → client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Sent once after a successful handshake, carries the dashboard snapshot.
    ConnectionEstablished,
    /// An order's approval was decided.
    ApprovalUpdate,
    /// The number of orders awaiting approval changed.
    PendingCountUpdate,
    /// A new customer registered.
    NewUser,
    /// An order was created or changed.
    OrderUpdate,
    /// Another administrator came online in the group.
    AdminJoined,
    /// An administrator left the group.
    AdminLeft,
    /// Reply to a client `ping`.
    Pong,
    /// Reply to `get_stats`.
    Stats,
}

impl MessageType {
    /// Wire name of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished => "connection_established",
            Self::ApprovalUpdate => "approval_update",
            Self::PendingCountUpdate => "pending_count_update",
            Self::NewUser => "new_user",
            Self::OrderUpdate => "order_update",
            Self::AdminJoined => "admin_joined",
            Self::AdminLeft => "admin_left",
            Self::Pong => "pong",
            Self::Stats => "stats",
        }
    }

    /// Whether messages of this type are fanned out to a group rather than
    /// addressed to a single connection.
    pub fn is_broadcast(&self) -> bool {
        !matches!(
            self,
            Self::ConnectionEstablished | Self::Pong | Self::Stats
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
