//! WebSocket wire protocol shared by the notification server and its clients.
//!
//! Every frame is a JSON text message. Server → client frames use the
//! envelope `{ "type", "data", "timestamp" }`; client → server frames carry a
//! `type` tag and an optional `timestamp`.

pub mod close;
pub mod envelope;
pub mod group;
pub mod inbound;
pub mod kind;
pub mod payload;

pub use close::CloseReason;
pub use envelope::{IncomingEnvelope, NotificationMessage, now_millis};
pub use group::validate_group_name;
pub use inbound::InboundMessage;
pub use kind::MessageType;
pub use payload::{
    ActivityEntry, ApprovalDecision, ApprovalUpdatePayload, ConnectionEstablishedPayload,
    DashboardSnapshot, NewUserPayload, OrderUpdatePayload, PendingCountPayload, PongPayload,
    PresencePayload,
};

/// Query parameter carrying the access token on the handshake.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Query parameter selecting the group to join on the handshake.
pub const GROUP_QUERY_PARAM: &str = "group";
