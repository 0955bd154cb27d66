//! Outbound message envelope.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::result::AppResult;

use super::kind::MessageType;

/// Current wall clock in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// The unit of broadcast: `{ "type", "data", "timestamp" }`.
///
/// Built by the server, published once, fanned out and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Message tag.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Type-specific payload.
    pub data: Value,
    /// Server-assigned creation time, epoch milliseconds.
    pub timestamp: i64,
}

impl NotificationMessage {
    /// Wrap an already-built JSON payload, stamping it with the current time.
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: now_millis(),
        }
    }

    /// Serialize a typed payload into a message.
    pub fn with_payload<T: Serialize>(kind: MessageType, payload: &T) -> AppResult<Self> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Encode the envelope as a JSON text frame.
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(AppError::from)
    }

    /// Decode an envelope from a JSON text frame.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw).map_err(AppError::from)
    }
}

/// Loosely-typed view of a server frame, used by clients.
///
/// The `type` stays a string so that clients keep working when the server
/// introduces new message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEnvelope {
    /// Message tag as sent.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload.
    #[serde(default)]
    pub data: Value,
    /// Server timestamp, if present.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl IncomingEnvelope {
    /// Parse a text frame.
    pub fn parse(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw).map_err(AppError::from)
    }

    /// Whether the tag matches a known message type.
    pub fn is(&self, kind: MessageType) -> bool {
        self.kind == kind.as_str()
    }

    /// Decode the payload into a typed struct.
    pub fn payload<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.data.clone()).map_err(AppError::from)
    }
}
