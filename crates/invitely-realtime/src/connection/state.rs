//! Connection lifecycle states and teardown reasons.

use std::fmt;

use invitely_core::protocol::CloseReason;

/// Lifecycle state of a server-side connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport accepted, authentication pending.
    Connecting = 0,
    /// Authenticated and registered.
    Open = 1,
    /// Teardown in progress.
    Closing = 2,
    /// Removed from the registry.
    Closed = 3,
}

impl ConnectionState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a connection is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from or writing to the transport failed.
    TransportError,
    /// No heartbeat within the timeout.
    HeartbeatTimeout,
    /// Too many consecutive malformed messages.
    FloodGuardTripped,
    /// The outbound queue overflowed.
    SlowConsumer,
    /// The engine is shutting down.
    ServerShutdown,
}

impl TeardownReason {
    /// Close frame to send, if the transport is still usable.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            Self::ClientClosed => Some(CloseReason::Normal),
            Self::TransportError => None,
            Self::HeartbeatTimeout => Some(CloseReason::HeartbeatTimeout),
            Self::FloodGuardTripped => Some(CloseReason::FloodGuardTripped),
            Self::SlowConsumer => Some(CloseReason::SlowConsumer),
            Self::ServerShutdown => Some(CloseReason::ServerShutdown),
        }
    }

    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::FloodGuardTripped => "flood_guard_tripped",
            Self::SlowConsumer => "slow_consumer",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
