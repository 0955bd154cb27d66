//! Close reasons surfaced to clients on the WebSocket close frame.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why the server ended a connection.
///
/// Application codes live in the 4000-4999 private range; shutdown and normal
/// closure reuse the RFC 6455 codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// Orderly close initiated by either peer.
    Normal,
    /// The handshake token was missing, malformed or expired.
    AuthenticationFailed,
    /// The token was valid but the principal is not privileged.
    AuthorizationFailed,
    /// No heartbeat within the configured timeout.
    HeartbeatTimeout,
    /// The server is shutting down.
    ServerShutdown,
    /// Too many consecutive malformed messages.
    FloodGuardTripped,
    /// The client did not drain its outbound queue fast enough.
    SlowConsumer,
}

impl CloseReason {
    /// WebSocket close code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::ServerShutdown => 1001,
            Self::AuthenticationFailed => 4001,
            Self::AuthorizationFailed => 4003,
            Self::HeartbeatTimeout => 4008,
            Self::FloodGuardTripped => 4009,
            Self::SlowConsumer => 4010,
        }
    }

    /// Map a close code back to a reason, if it is one of ours.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::ServerShutdown),
            4001 => Some(Self::AuthenticationFailed),
            4003 => Some(Self::AuthorizationFailed),
            4008 => Some(Self::HeartbeatTimeout),
            4009 => Some(Self::FloodGuardTripped),
            4010 => Some(Self::SlowConsumer),
            _ => None,
        }
    }

    /// Reason text sent with the close frame.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AuthorizationFailed => "AuthorizationFailed",
            Self::HeartbeatTimeout => "HeartbeatTimeout",
            Self::ServerShutdown => "ServerShutdown",
            Self::FloodGuardTripped => "FloodGuardTripped",
            Self::SlowConsumer => "SlowConsumer",
        }
    }

    /// Whether the connection attempt was refused before reaching `OPEN`.
    pub fn is_handshake_rejection(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::AuthorizationFailed)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
