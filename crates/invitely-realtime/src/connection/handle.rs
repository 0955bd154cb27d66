//! Individual WebSocket connection handle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use invitely_core::protocol::{CloseReason, NotificationMessage};
use invitely_core::types::{ConnectionId, PrincipalId, UserRole};

use super::authenticator::Principal;
use super::state::{ConnectionState, TeardownReason};
use super::transport::OutboundFrame;

/// Result of pushing a frame onto a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The frame was queued for the writer task.
    Queued,
    /// The queue is full; the client is not keeping up.
    Overflow,
    /// The writer is gone or the connection is no longer open.
    Closed,
}

/// A handle to a single authenticated WebSocket connection.
///
/// Holds the sender for the connection's outbound queue plus the metadata
/// the registry and the heartbeat supervisor need.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Authenticated principal.
    pub principal: Principal,
    /// Group the connection joined on handshake.
    pub group: String,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundFrame>,
    state: AtomicU8,
    last_heartbeat: Mutex<Instant>,
    teardown: Mutex<Option<TeardownReason>>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle in the `Connecting` state.
    pub fn new(
        principal: Principal,
        group: impl Into<String>,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            principal,
            group: group.into(),
            connected_at: Utc::now(),
            sender,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            last_heartbeat: Mutex::new(Instant::now()),
            teardown: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Principal that owns this connection.
    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal.id
    }

    /// Cached role of the principal.
    pub fn role(&self) -> UserRole {
        self.principal.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether broadcasts should still be delivered.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Queue a pre-serialized frame without waiting.
    pub fn deliver(&self, text: Arc<str>) -> DeliveryOutcome {
        if !self.is_open() {
            return DeliveryOutcome::Closed;
        }
        self.enqueue(text)
    }

    fn enqueue(&self, text: Arc<str>) -> DeliveryOutcome {
        match self.sender.try_send(OutboundFrame::Text(text)) {
            Ok(()) => DeliveryOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => DeliveryOutcome::Overflow,
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::Closed,
        }
    }

    /// Serialize and queue a message addressed to this connection only.
    ///
    /// Unlike [`deliver`](Self::deliver) this works before the connection
    /// is `Open`, so `connection_established` always precedes broadcasts.
    pub fn send_message(&self, message: &NotificationMessage) -> DeliveryOutcome {
        match message.to_json() {
            Ok(json) => self.enqueue(Arc::from(json)),
            Err(e) => {
                tracing::error!(conn_id = %self.id, error = %e, "Failed to serialize direct message");
                DeliveryOutcome::Closed
            }
        }
    }

    /// Queue a close frame. Best effort: a full queue means the writer is
    /// stuck and will be aborted anyway.
    pub(crate) fn push_close(&self, reason: CloseReason) {
        let _ = self.sender.try_send(OutboundFrame::Close(reason));
    }

    /// Ask the owning connection task to tear down with `reason`.
    ///
    /// Only the first request is kept; later ones are ignored.
    pub fn request_close(&self, reason: TeardownReason) {
        if let Ok(mut slot) = self.teardown.lock() {
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.cancel.cancel();
    }

    /// Reason recorded by the first [`request_close`](Self::request_close).
    pub fn requested_teardown(&self) -> Option<TeardownReason> {
        self.teardown.lock().ok().and_then(|slot| *slot)
    }

    /// Token cancelled once a teardown is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Mark the connection as alive now.
    pub fn record_heartbeat(&self) {
        if let Ok(mut last) = self.last_heartbeat.lock() {
            *last = Instant::now();
        }
    }

    /// Time since the last heartbeat.
    pub fn since_last_heartbeat(&self) -> Duration {
        self.last_heartbeat
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    /// Serializable view for diagnostics.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            principal_id: self.principal.id.clone(),
            role: self.principal.role,
            name: self.principal.name.clone(),
            group: self.group.clone(),
            connected_at: self.connected_at,
            state: format!("{:?}", self.state()),
        }
    }
}

/// Snapshot of connection info.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Connection ID.
    pub id: ConnectionId,
    /// Principal ID.
    pub principal_id: PrincipalId,
    /// Role.
    pub role: UserRole,
    /// Display name, when the token carries one.
    pub name: Option<String>,
    /// Joined group.
    pub group: String,
    /// Connected at.
    pub connected_at: DateTime<Utc>,
    /// Lifecycle state.
    pub state: String,
}
