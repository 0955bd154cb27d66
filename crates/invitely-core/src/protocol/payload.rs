//! Type-specific `data` payloads of outbound messages.

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, PrincipalId};

/// Aggregate figures shown on the admin dashboard.
///
/// Supplied by the snapshot collaborator; used for `connection_established`
/// and `stats` replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Orders awaiting an approval decision.
    pub pending_count: u64,
    /// Orders approved since midnight.
    #[serde(default)]
    pub approved_today: u64,
    /// Registered customers.
    #[serde(default)]
    pub total_users: u64,
    /// Orders ever placed.
    #[serde(default)]
    pub total_orders: u64,
    /// Most recent activity, newest first.
    #[serde(default)]
    pub recent_activity: Vec<ActivityEntry>,
}

/// One line of the dashboard activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Message type that produced the entry (e.g. `new_user`).
    pub kind: String,
    /// Short human-readable summary.
    pub summary: String,
    /// When it happened, in epoch milliseconds.
    pub timestamp: i64,
}

/// `connection_established` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEstablishedPayload {
    /// Server-assigned connection id.
    pub connection_id: ConnectionId,
    /// Authenticated principal.
    pub principal_id: PrincipalId,
    /// Group the connection joined.
    pub group: String,
    /// Server heartbeat supervision tick.
    pub heartbeat_interval_seconds: u64,
    /// Silence after which the server drops the connection.
    pub heartbeat_timeout_seconds: u64,
    /// Dashboard figures at connect time.
    pub snapshot: DashboardSnapshot,
}

/// `new_user` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserPayload {
    /// Customer id.
    pub user_id: String,
    /// Display name or username.
    pub username: String,
    /// Contact email, when shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Registration time, epoch milliseconds.
    pub registered_at: i64,
}

/// Outcome of an approval review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// The order was approved.
    Approved,
    /// The order was rejected.
    Rejected,
}

/// `approval_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalUpdatePayload {
    /// Order under review.
    pub order_id: String,
    /// Decision taken.
    pub decision: ApprovalDecision,
    /// Administrator who decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    /// Free-form rejection or approval note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Pending count after the decision, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_count: Option<u64>,
}

/// `pending_count_update` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCountPayload {
    /// Orders awaiting approval.
    pub pending_count: u64,
}

/// `order_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdatePayload {
    /// Order id.
    pub order_id: String,
    /// What happened (`created`, `paid`, `cancelled`, ...).
    pub action: String,
    /// Order status after the change.
    pub status: String,
    /// Customer display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    /// Order total in minor currency units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<i64>,
}

/// `admin_joined` / `admin_left` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    /// Administrator who joined or left.
    pub principal_id: PrincipalId,
    /// Display name from the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Group concerned.
    pub group: String,
    /// Distinct administrators now in the group.
    pub admin_count: usize,
    /// Open connections now in the group.
    pub connection_count: usize,
}

/// `pong` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongPayload {
    /// Timestamp the client put on its ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<i64>,
    /// Server clock when the ping was handled.
    pub server_timestamp: i64,
}
