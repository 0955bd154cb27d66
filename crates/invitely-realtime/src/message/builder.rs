//! Builders for messages the server addresses to a single connection.

use invitely_core::protocol::{
    ConnectionEstablishedPayload, DashboardSnapshot, MessageType, NotificationMessage,
    PendingCountPayload, PongPayload, PresencePayload, now_millis,
};
use invitely_core::result::AppResult;

use crate::connection::handle::ConnectionHandle;
use crate::connection::heartbeat::HeartbeatConfig;

/// `connection_established`, sent once right after the handshake.
pub fn connection_established(
    handle: &ConnectionHandle,
    heartbeat: HeartbeatConfig,
    snapshot: DashboardSnapshot,
) -> AppResult<NotificationMessage> {
    NotificationMessage::with_payload(
        MessageType::ConnectionEstablished,
        &ConnectionEstablishedPayload {
            connection_id: handle.id,
            principal_id: handle.principal.id.clone(),
            group: handle.group.clone(),
            heartbeat_interval_seconds: heartbeat.interval.as_secs(),
            heartbeat_timeout_seconds: heartbeat.timeout.as_secs(),
            snapshot,
        },
    )
}

/// `pong`, echoing the client's timestamp.
pub fn pong(client_timestamp: Option<i64>) -> AppResult<NotificationMessage> {
    NotificationMessage::with_payload(
        MessageType::Pong,
        &PongPayload {
            client_timestamp,
            server_timestamp: now_millis(),
        },
    )
}

/// `stats`, the reply to `get_stats`.
pub fn stats(snapshot: &DashboardSnapshot) -> AppResult<NotificationMessage> {
    NotificationMessage::with_payload(MessageType::Stats, snapshot)
}

/// `pending_count_update`, either broadcast or as a direct reply.
pub fn pending_count(pending_count: u64) -> AppResult<NotificationMessage> {
    NotificationMessage::with_payload(
        MessageType::PendingCountUpdate,
        &PendingCountPayload { pending_count },
    )
}

/// `admin_joined` or `admin_left`.
pub fn presence(kind: MessageType, payload: &PresencePayload) -> AppResult<NotificationMessage> {
    NotificationMessage::with_payload(kind, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_echoes_client_timestamp() {
        let msg = pong(Some(42)).unwrap();
        assert_eq!(msg.kind, MessageType::Pong);
        assert_eq!(msg.data["client_timestamp"], 42);
        assert!(msg.data["server_timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_pending_count_shape() {
        let json = pending_count(7).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "pending_count_update");
        assert_eq!(value["data"]["pending_count"], 7);
        assert!(value["timestamp"].is_i64());
    }
}
