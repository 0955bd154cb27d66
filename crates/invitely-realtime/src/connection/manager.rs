//! Connection manager: drives one WebSocket connection from handshake to
//! teardown.
//!
//! Each accepted transport gets its own task running [`ConnectionManager::serve`]
//! plus a writer task draining the connection's bounded outbound queue.
//! The registry slot taken at registration is released on every exit path,
//! including the task being dropped mid-flight.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use invitely_core::config::RealtimeConfig;
use invitely_core::error::{AppError, ErrorKind};
use invitely_core::protocol::{CloseReason, InboundMessage, MessageType, PresencePayload};
use invitely_core::types::ConnectionId;

use crate::bridge::GroupFanout;
use crate::message::{builder, validator};
use crate::metrics::RealtimeMetrics;
use crate::notification::BroadcastDispatcher;
use crate::presence::PresenceTracker;
use crate::registry::{Departure, SessionRegistry};
use crate::snapshot::SnapshotProvider;

use super::authenticator::{Principal, TokenAuthenticator};
use super::flood::FloodGuard;
use super::handle::{ConnectionHandle, DeliveryOutcome};
use super::heartbeat::{self, HeartbeatConfig};
use super::state::{ConnectionState, TeardownReason};
use super::transport::{Frame, OutboundFrame};

/// How long the writer may keep flushing after teardown.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Credentials and target group extracted from the transport handshake.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    /// Access token from `?token=` or the `Authorization` header.
    pub token: Option<String>,
    /// Group from `?group=`; the configured default when absent.
    pub group: Option<String>,
}

/// Manages the lifecycle of every WebSocket connection.
#[derive(Debug)]
pub struct ConnectionManager {
    config: RealtimeConfig,
    registry: Arc<SessionRegistry>,
    fanout: Arc<GroupFanout>,
    dispatcher: BroadcastDispatcher,
    authenticator: Arc<dyn TokenAuthenticator>,
    snapshots: Arc<dyn SnapshotProvider>,
    presence: PresenceTracker,
    metrics: Arc<RealtimeMetrics>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RealtimeConfig,
        registry: Arc<SessionRegistry>,
        fanout: Arc<GroupFanout>,
        dispatcher: BroadcastDispatcher,
        authenticator: Arc<dyn TokenAuthenticator>,
        snapshots: Arc<dyn SnapshotProvider>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        let presence = PresenceTracker::new(config.presence_mode);
        Self {
            config,
            registry,
            fanout,
            dispatcher,
            authenticator,
            snapshots,
            presence,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Heartbeat settings announced to clients and enforced per connection.
    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig::from(&self.config)
    }

    /// Engine configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Shared session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Whether new connections are still accepted.
    pub fn is_accepting(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Serve one transport until it closes.
    ///
    /// `sink` and `stream` are the two halves of an upgraded WebSocket,
    /// adapted to [`Frame`].
    pub async fn serve<Si, St, E>(
        self: Arc<Self>,
        mut sink: Si,
        mut stream: St,
        request: HandshakeRequest,
    ) where
        Si: Sink<Frame> + Unpin + Send + 'static,
        Si::Error: Display + Send,
        St: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        if !self.is_accepting() {
            reject(&mut sink, CloseReason::ServerShutdown).await;
            return;
        }

        let (principal, group) = match self.admit(&request).await {
            Ok(admitted) => admitted,
            Err(reason) => {
                self.metrics.handshake_rejected();
                reject(&mut sink, reason).await;
                return;
            }
        };

        let _relay = match self.fanout.acquire(&group).await {
            Ok(lease) => lease,
            Err(e) => {
                error!(group = %group, error = %e, "Bus subscription failed, refusing connection");
                reject(&mut sink, CloseReason::ServerShutdown).await;
                return;
            }
        };

        let (tx, rx) = mpsc::channel(self.config.send_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(principal, group.clone(), tx));
        let writer = tokio::spawn(write_loop(sink, rx, handle.clone()));

        self.registry.register(handle.clone());
        let slot = RegistrySlot {
            manager: self.clone(),
            conn_id: handle.id,
            armed: true,
        };

        self.open(&handle).await;

        if self.shutdown.is_cancelled() {
            handle.request_close(TeardownReason::ServerShutdown);
        }

        let reason = self.drive(&handle, &mut stream).await;
        self.teardown(&handle, reason).await;
        slot.disarm();
        finish_writer(writer, reason).await;
    }

    /// Authenticate and authorize the handshake.
    async fn admit(&self, request: &HandshakeRequest) -> Result<(Principal, String), CloseReason> {
        let token = request.token.as_deref().unwrap_or_default();
        let principal = match self.authenticator.authenticate(token).await {
            Ok(principal) => principal,
            Err(e) => {
                warn!(error = %e, "WebSocket authentication failed");
                return Err(match e.kind {
                    ErrorKind::Authorization => CloseReason::AuthorizationFailed,
                    _ => CloseReason::AuthenticationFailed,
                });
            }
        };

        if !principal.role.is_privileged() {
            warn!(principal = %principal.id, role = %principal.role, "Non-privileged principal refused");
            return Err(CloseReason::AuthorizationFailed);
        }

        let group = request
            .group
            .clone()
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| self.config.default_group.clone());
        if let Err(e) = validator::validate_group_name(&group) {
            warn!(principal = %principal.id, group = %group, error = %e, "Invalid group requested");
            return Err(CloseReason::AuthorizationFailed);
        }

        Ok((principal, group))
    }

    /// Send the greeting, open the connection and join its group.
    async fn open(&self, handle: &Arc<ConnectionHandle>) {
        let snapshot = match self.snapshots.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(conn_id = %handle.id, error = %e, "Snapshot unavailable, sending empty one");
                Default::default()
            }
        };
        match builder::connection_established(handle, self.heartbeat_config(), snapshot) {
            Ok(message) => {
                handle.send_message(&message);
            }
            Err(e) => error!(conn_id = %handle.id, error = %e, "Failed to build connection_established"),
        }

        handle.set_state(ConnectionState::Open);
        self.metrics.connection_opened();

        match self.registry.join(&handle.group, handle.id) {
            Ok(outcome) => {
                if let Some(payload) = self.presence.on_join(handle, &handle.group, &outcome) {
                    self.announce(MessageType::AdminJoined, &handle.group, &payload).await;
                }
            }
            Err(e) => error!(conn_id = %handle.id, error = %e, "Failed to join group"),
        }

        info!(
            conn_id = %handle.id,
            principal = %handle.principal.id,
            role = %handle.principal.role,
            group = %handle.group,
            "WebSocket connection opened"
        );
    }

    /// Pump inbound frames until something ends the connection.
    async fn drive<St, E>(&self, handle: &Arc<ConnectionHandle>, stream: &mut St) -> TeardownReason
    where
        St: Stream<Item = Result<Frame, E>> + Unpin,
        E: Display,
    {
        let heartbeat = heartbeat::supervise(handle.clone(), self.heartbeat_config());
        tokio::pin!(heartbeat);
        let mut flood = FloodGuard::new(self.config.max_consecutive_parse_failures);

        loop {
            tokio::select! {
                _ = handle.cancelled() => {
                    return handle
                        .requested_teardown()
                        .unwrap_or(TeardownReason::ServerShutdown);
                }
                _ = &mut heartbeat => {
                    self.metrics.heartbeat_timeout();
                    return TeardownReason::HeartbeatTimeout;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        if let Some(reason) = self.handle_inbound(handle, &text, &mut flood).await {
                            return reason;
                        }
                    }
                    Some(Ok(Frame::Control)) => {}
                    Some(Ok(Frame::Close(_))) | None => return TeardownReason::ClientClosed,
                    Some(Err(e)) => {
                        debug!(conn_id = %handle.id, error = %e, "WebSocket receive error");
                        return TeardownReason::TransportError;
                    }
                },
            }
        }
    }

    /// Process one inbound text frame. Returns a reason when the connection
    /// must close.
    async fn handle_inbound(
        &self,
        handle: &ConnectionHandle,
        raw: &str,
        flood: &mut FloodGuard,
    ) -> Option<TeardownReason> {
        self.metrics.message_received();

        let parsed = validator::validate_inbound(raw, self.config.max_message_bytes)
            .and_then(|()| serde_json::from_str::<InboundMessage>(raw).map_err(AppError::from));
        let message = match parsed {
            Ok(message) => {
                flood.reset();
                message
            }
            Err(e) => {
                self.metrics.parse_failure();
                warn!(
                    conn_id = %handle.id,
                    consecutive = flood.consecutive() + 1,
                    error = %e,
                    "Dropping malformed message"
                );
                if flood.record_failure() {
                    warn!(conn_id = %handle.id, "Flood guard tripped");
                    return Some(TeardownReason::FloodGuardTripped);
                }
                return None;
            }
        };

        let reply = match message {
            InboundMessage::Ping { timestamp } => {
                handle.record_heartbeat();
                builder::pong(timestamp)
            }
            InboundMessage::GetStats { .. } => match self.snapshots.snapshot().await {
                Ok(snapshot) => builder::stats(&snapshot),
                Err(e) => {
                    warn!(conn_id = %handle.id, error = %e, "Stats query failed");
                    return None;
                }
            },
            InboundMessage::GetPendingCount { .. } => match self.snapshots.pending_count().await {
                Ok(count) => builder::pending_count(count),
                Err(e) => {
                    warn!(conn_id = %handle.id, error = %e, "Pending count query failed");
                    return None;
                }
            },
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                error!(conn_id = %handle.id, error = %e, "Failed to build reply");
                return None;
            }
        };
        match handle.send_message(&reply) {
            DeliveryOutcome::Queued => {
                self.metrics.messages_sent(1);
                None
            }
            DeliveryOutcome::Overflow => {
                self.metrics.slow_consumer();
                Some(TeardownReason::SlowConsumer)
            }
            DeliveryOutcome::Closed => Some(TeardownReason::TransportError),
        }
    }

    /// Remove the connection from the registry and announce its departure.
    ///
    /// Safe to call more than once: only the first call finds the
    /// connection registered.
    pub async fn teardown(&self, handle: &Arc<ConnectionHandle>, reason: TeardownReason) {
        let was_open = matches!(
            handle.state(),
            ConnectionState::Open | ConnectionState::Closing
        );
        handle.set_state(ConnectionState::Closing);
        if let Some(close) = reason.close_reason() {
            handle.push_close(close);
        }

        let announcements = match self.registry.unregister(handle.id) {
            Some(departure) => self.depart(departure, was_open),
            None => Vec::new(),
        };
        handle.set_state(ConnectionState::Closed);

        for (group, payload) in announcements {
            self.announce(MessageType::AdminLeft, &group, &payload).await;
        }

        info!(conn_id = %handle.id, principal = %handle.principal.id, reason = %reason, "WebSocket connection closed");
    }

    /// Ask every open connection to close with `reason` and stop accepting.
    pub fn close_all(&self, reason: TeardownReason) -> usize {
        self.shutdown.cancel();
        let all = self.registry.all_connections();
        for handle in &all {
            handle.request_close(reason);
        }
        info!(count = all.len(), reason = %reason, "Closing all connections");
        all.len()
    }

    fn depart(&self, departure: Departure, was_open: bool) -> Vec<(String, PresencePayload)> {
        if was_open {
            self.metrics.connection_closed();
        }
        departure
            .left
            .iter()
            .filter_map(|(group, outcome)| {
                self.presence
                    .on_leave(&departure.handle, group, outcome)
                    .map(|payload| (group.clone(), payload))
            })
            .collect()
    }

    async fn announce(&self, kind: MessageType, group: &str, payload: &PresencePayload) {
        match builder::presence(kind, payload) {
            Ok(message) => {
                self.dispatcher.publish_message(group, &message).await;
            }
            Err(e) => error!(group = %group, error = %e, "Failed to build presence message"),
        }
    }
}

/// Releases the registry slot if `serve` is dropped before its own teardown.
struct RegistrySlot {
    manager: Arc<ConnectionManager>,
    conn_id: ConnectionId,
    armed: bool,
}

impl RegistrySlot {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RegistrySlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(departure) = self.manager.registry.unregister(self.conn_id) else {
            return;
        };
        let handle = departure.handle.clone();
        let was_open = matches!(
            handle.state(),
            ConnectionState::Open | ConnectionState::Closing
        );
        handle.set_state(ConnectionState::Closed);
        let announcements = self.manager.depart(departure, was_open);
        warn!(conn_id = %self.conn_id, "Connection task dropped, registry slot released");

        if announcements.is_empty() {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let manager = self.manager.clone();
            runtime.spawn(async move {
                for (group, payload) in announcements {
                    manager.announce(MessageType::AdminLeft, &group, &payload).await;
                }
            });
        }
    }
}

async fn reject<Si>(sink: &mut Si, reason: CloseReason)
where
    Si: Sink<Frame> + Unpin,
    Si::Error: Display,
{
    debug!(reason = %reason, code = reason.code(), "Rejecting WebSocket handshake");
    if let Err(e) = sink.send(Frame::Close(Some(reason))).await {
        debug!(error = %e, "Failed to send close frame");
    }
    let _ = sink.close().await;
}

async fn write_loop<Si>(
    mut sink: Si,
    mut rx: mpsc::Receiver<OutboundFrame>,
    handle: Arc<ConnectionHandle>,
) where
    Si: Sink<Frame> + Unpin,
    Si::Error: Display,
{
    while let Some(frame) = rx.recv().await {
        let closing = matches!(frame, OutboundFrame::Close(_));
        if let Err(e) = sink.send(Frame::from(frame)).await {
            debug!(conn_id = %handle.id, error = %e, "WebSocket write failed");
            handle.request_close(TeardownReason::TransportError);
            return;
        }
        if closing {
            let _ = sink.close().await;
            return;
        }
    }
}

async fn finish_writer(writer: JoinHandle<()>, reason: TeardownReason) {
    if reason == TeardownReason::TransportError {
        writer.abort();
        return;
    }
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_GRACE, writer).await.is_err() {
        abort.abort();
    }
}
