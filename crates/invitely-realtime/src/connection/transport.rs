//! Transport-neutral frame type.
//!
//! The HTTP layer adapts its WebSocket implementation to a sink and a stream
//! of [`Frame`]s so the connection lifecycle can be driven (and tested)
//! without a real socket.

use invitely_core::protocol::CloseReason;

/// One WebSocket frame as seen by the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON text frame.
    Text(String),
    /// Close frame, with our reason when the code is one we know.
    Close(Option<CloseReason>),
    /// Ping, pong or binary frames; ignored by the protocol.
    Control,
}

/// Item queued on a connection's outbound buffer.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// Serialized envelope, shared between all recipients of a broadcast.
    Text(std::sync::Arc<str>),
    /// Close the transport with this reason and stop writing.
    Close(CloseReason),
}

impl From<OutboundFrame> for Frame {
    fn from(frame: OutboundFrame) -> Self {
        match frame {
            OutboundFrame::Text(text) => Frame::Text(text.to_string()),
            OutboundFrame::Close(reason) => Frame::Close(Some(reason)),
        }
    }
}
