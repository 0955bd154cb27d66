//! Client error type.

use thiserror::Error;

use crate::state::{ClientEvent, ClientState};

/// Errors surfaced by the client connection manager.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A send or receive failed on an established transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// The requested operation is not valid in the current state.
    #[error("invalid transition from {from:?} on {event:?}")]
    InvalidTransition {
        /// State the machine was in.
        from: ClientState,
        /// Event that was rejected.
        event: ClientEvent,
    },

    /// Client settings are out of range.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// Sending requires an open connection.
    #[error("not connected")]
    NotConnected,

    /// `connect()` and `retry()` must run inside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A message could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
