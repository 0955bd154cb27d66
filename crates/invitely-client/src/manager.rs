//! Client connection manager.
//!
//! One [`ClientConnectionManager`] owns one logical subscription. A driver
//! task runs sessions back to back: connect, wait for
//! `connection_established`, then ping on an interval and route inbound
//! envelopes until the transport fails or goes silent. Between sessions it
//! waits out the backoff delay computed by [`ReconnectState`].
//!
//! Every driver is tagged with a generation number. `disconnect()` bumps the
//! generation under the control lock and then waits for any in-flight
//! callback, so a stale driver can neither change the visible state nor
//! invoke a callback once `disconnect()` has returned.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, sleep_until, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use invitely_core::protocol::{
    CloseReason, InboundMessage, IncomingEnvelope, MessageType, now_millis,
};

use crate::backoff::sample_jitter;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::router::MessageRouter;
use crate::state::{ClientEvent, ClientState, ReconnectState};
use crate::transport::{ClientFrame, Connector, FrameSink, FrameStream, WsConnector};

/// Time allowed to flush a close frame when disconnecting.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a message callback.
struct CallbackScope;

impl CallbackScope {
    fn enter() -> Self {
        IN_CALLBACK.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_CALLBACK.with(|flag| flag.set(false));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// `disconnect()` was called or the driver went stale.
    Cancelled,
    /// The session failed and the machine should take this event.
    Failed(ClientEvent),
}

struct Control {
    machine: ReconnectState,
    cancel: Option<CancellationToken>,
}

struct Outbound {
    generation: u64,
    sender: mpsc::UnboundedSender<ClientFrame>,
}

struct Inner {
    config: ClientConfig,
    url: String,
    token: RwLock<Option<String>>,
    connector: Arc<dyn Connector>,
    router: MessageRouter,
    state_tx: watch::Sender<ClientState>,
    control: Mutex<Control>,
    generation: AtomicU64,
    dispatch_gate: Mutex<()>,
    outbound: Mutex<Option<Outbound>>,
}

/// Keeps a notification subscription alive across transport failures.
///
/// Dropping the manager disconnects it.
pub struct ClientConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ClientConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnectionManager")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("router", &self.inner.router)
            .finish()
    }
}

impl ClientConnectionManager {
    /// Creates an idle manager that will connect to `url` through `connector`.
    ///
    /// Out-of-range settings are clamped (see [`ClientConfig::clamped`]).
    pub fn new(url: impl Into<String>, config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Adjusting client settings");
        }
        let config = config.clamped();
        let machine = ReconnectState::new(config.backoff(), config.max_attempts);
        let (state_tx, _) = watch::channel(ClientState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                url: url.into(),
                token: RwLock::new(None),
                connector,
                router: MessageRouter::new(),
                state_tx,
                control: Mutex::new(Control {
                    machine,
                    cancel: None,
                }),
                generation: AtomicU64::new(0),
                dispatch_gate: Mutex::new(()),
                outbound: Mutex::new(None),
            }),
        }
    }

    /// Creates an idle manager using the WebSocket connector.
    pub fn websocket(url: impl Into<String>, config: ClientConfig) -> Self {
        Self::new(url, config, Arc::new(WsConnector))
    }

    /// Token presented on every subsequent handshake.
    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut slot) = self.inner.token.write() {
            *slot = Some(token.into());
        }
    }

    /// Connect without a token from now on.
    pub fn clear_token(&self) {
        if let Ok(mut slot) = self.inner.token.write() {
            *slot = None;
        }
    }

    /// Start connecting. Valid only while `Idle`.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.start(ClientEvent::Connect)
    }

    /// Start over after the manager gave up. Valid only while `Failed`.
    pub fn retry(&self) -> Result<(), ClientError> {
        self.start(ClientEvent::Retry)
    }

    /// Stop the driver, close the transport and return to `Idle`.
    ///
    /// No callback runs after this returns. Safe to call from inside a
    /// callback and in any state.
    pub fn disconnect(&self) {
        {
            let mut control = lock(&self.inner.control);
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(cancel) = control.cancel.take() {
                cancel.cancel();
            }
            if let Err(e) = control.machine.apply(ClientEvent::Disconnect, 0.0) {
                debug!(error = %e, "Disconnect transition rejected");
            }
            self.inner.state_tx.send_replace(ClientState::Idle);
        }
        lock(&self.inner.outbound).take();

        if !IN_CALLBACK.with(Cell::get) {
            drop(lock(&self.inner.dispatch_gate));
        }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        *self.inner.state_tx.borrow()
    }

    /// Watch state changes.
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.inner.state_tx.subscribe()
    }

    /// When the last `pong` arrived.
    pub fn last_heartbeat_ack(&self) -> Option<Instant> {
        lock(&self.inner.control).machine.last_heartbeat_ack()
    }

    /// Consecutive failed attempts since the last successful handshake.
    pub fn attempt(&self) -> u32 {
        lock(&self.inner.control).machine.attempt()
    }

    /// Callback table.
    pub fn router(&self) -> &MessageRouter {
        &self.inner.router
    }

    /// Register a typed callback for `kind`.
    pub fn on<T, F>(&self, kind: MessageType, callback: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.router.on(kind, callback);
    }

    /// Register a raw callback for any `type` string.
    pub fn on_raw<F>(&self, kind: impl Into<String>, callback: F)
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        self.inner.router.on_raw(kind, callback);
    }

    /// Queue a message for the server. Fails unless `Open`.
    pub fn send(&self, message: &InboundMessage) -> Result<(), ClientError> {
        if self.state() != ClientState::Open {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(message)?;
        let outbound = lock(&self.inner.outbound);
        let sender = outbound.as_ref().ok_or(ClientError::NotConnected)?;
        sender
            .sender
            .send(ClientFrame::Text(text))
            .map_err(|_| ClientError::NotConnected)
    }

    fn start(&self, event: ClientEvent) -> Result<(), ClientError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let mut control = lock(&self.inner.control);
        let next = control.machine.apply(event, 0.0)?;
        self.inner.state_tx.send_replace(next);

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        control.cancel = Some(cancel.clone());
        drop(control);

        debug!(url = %self.inner.url, generation, "Starting client driver");
        runtime.spawn(Arc::clone(&self.inner).drive(generation, cancel));
        Ok(())
    }
}

impl Drop for ClientConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Inner {
    async fn drive(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        loop {
            let event = match self.session(generation, &cancel).await {
                SessionEnd::Cancelled => return,
                SessionEnd::Failed(event) => event,
            };
            self.clear_outbound(generation);

            let Some(ClientState::Reconnecting) = self.transition(generation, event) else {
                return;
            };
            let Some(delay) = self.pending_delay() else {
                warn!(url = %self.url, ?event, "Reconnect attempts exhausted, giving up");
                self.transition(generation, ClientEvent::AttemptsExhausted);
                return;
            };
            info!(delay_ms = delay.as_millis() as u64, ?event, "Reconnecting after backoff");

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }
            if self.transition(generation, ClientEvent::BackoffElapsed) != Some(ClientState::Connecting) {
                return;
            }
        }
    }

    async fn session(&self, generation: u64, cancel: &CancellationToken) -> SessionEnd {
        let deadline = Instant::now() + self.config.handshake_timeout;
        let token = self.token.read().ok().and_then(|t| t.clone());

        let connected = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = timeout_at(deadline, self.connector.connect(&self.url, token.as_deref())) => result,
        };
        let (mut sink, mut stream) = match connected {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                warn!(url = %self.url, error = %e, "Connect failed");
                return SessionEnd::Failed(ClientEvent::HandshakeFailed);
            }
            Err(_) => {
                warn!(url = %self.url, "Connect timed out");
                return SessionEnd::Failed(ClientEvent::HandshakeFailed);
            }
        };

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    close_gracefully(&mut sink).await;
                    return SessionEnd::Cancelled;
                }
                item = timeout_at(deadline, stream.next()) => item,
            };
            let frame = match item {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Transport error during handshake");
                    return SessionEnd::Failed(ClientEvent::HandshakeFailed);
                }
                Ok(None) => {
                    warn!("Transport closed during handshake");
                    return SessionEnd::Failed(ClientEvent::HandshakeFailed);
                }
                Err(_) => {
                    warn!("No connection_established within handshake timeout");
                    return SessionEnd::Failed(ClientEvent::HandshakeFailed);
                }
            };

            match frame {
                ClientFrame::Text(text) => match IncomingEnvelope::parse(&text) {
                    Ok(envelope) if envelope.is(MessageType::ConnectionEstablished) => {
                        if self.transition(generation, ClientEvent::HandshakeSucceeded)
                            != Some(ClientState::Open)
                        {
                            close_gracefully(&mut sink).await;
                            return SessionEnd::Cancelled;
                        }
                        info!(url = %self.url, "Notification stream open");
                        if !self.dispatch(generation, &envelope) {
                            close_gracefully(&mut sink).await;
                            return SessionEnd::Cancelled;
                        }
                        break;
                    }
                    Ok(envelope) => debug!(kind = %envelope.kind, "Ignoring message before handshake"),
                    Err(e) => warn!(error = %e, "Malformed frame during handshake"),
                },
                ClientFrame::Close(code) => {
                    log_close(code);
                    return SessionEnd::Failed(ClientEvent::HandshakeFailed);
                }
                ClientFrame::Other => {}
            }
        }

        self.run_open(generation, cancel, sink, stream).await
    }

    async fn run_open(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        mut sink: FrameSink,
        mut stream: FrameStream,
    ) -> SessionEnd {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(Outbound {
            generation,
            sender: out_tx,
        });

        let heartbeat_interval = self.config.heartbeat_interval;
        let mut ping = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    close_gracefully(&mut sink).await;
                    return SessionEnd::Cancelled;
                }
                _ = sleep_until(last_inbound + self.config.heartbeat_timeout) => {
                    warn!(
                        silent_ms = last_inbound.elapsed().as_millis() as u64,
                        "No inbound traffic within heartbeat timeout"
                    );
                    return SessionEnd::Failed(ClientEvent::HeartbeatTimedOut);
                }
                _ = ping.tick() => {
                    let frame = match serde_json::to_string(&InboundMessage::ping(now_millis())) {
                        Ok(text) => ClientFrame::Text(text),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode ping");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(frame).await {
                        warn!(error = %e, "Ping send failed");
                        return SessionEnd::Failed(ClientEvent::TransportClosed);
                    }
                }
                Some(frame) = out_rx.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        warn!(error = %e, "Send failed");
                        return SessionEnd::Failed(ClientEvent::TransportClosed);
                    }
                }
                item = stream.next() => {
                    let frame = match item {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            warn!(error = %e, "Transport error");
                            return SessionEnd::Failed(ClientEvent::TransportClosed);
                        }
                        None => {
                            info!("Transport closed by server");
                            return SessionEnd::Failed(ClientEvent::TransportClosed);
                        }
                    };
                    last_inbound = Instant::now();

                    match frame {
                        ClientFrame::Text(text) => match IncomingEnvelope::parse(&text) {
                            Ok(envelope) => {
                                if envelope.is(MessageType::Pong) {
                                    self.record_heartbeat_ack(generation);
                                }
                                if !self.dispatch(generation, &envelope) {
                                    close_gracefully(&mut sink).await;
                                    return SessionEnd::Cancelled;
                                }
                            }
                            Err(e) => warn!(error = %e, "Dropping malformed frame"),
                        },
                        ClientFrame::Close(code) => {
                            log_close(code);
                            return SessionEnd::Failed(ClientEvent::TransportClosed);
                        }
                        ClientFrame::Other => {}
                    }
                }
            }
        }
    }

    /// Apply `event` if this driver is still current. Returns the new state.
    fn transition(&self, generation: u64, event: ClientEvent) -> Option<ClientState> {
        let mut control = lock(&self.control);
        if self.generation.load(Ordering::SeqCst) != generation {
            return None;
        }
        match control.machine.apply(event, sample_jitter()) {
            Ok(next) => {
                self.state_tx.send_replace(next);
                Some(next)
            }
            Err(e) => {
                warn!(error = %e, "Unexpected client transition");
                None
            }
        }
    }

    fn pending_delay(&self) -> Option<Duration> {
        lock(&self.control).machine.pending_delay()
    }

    fn record_heartbeat_ack(&self, generation: u64) {
        let mut control = lock(&self.control);
        if self.generation.load(Ordering::SeqCst) == generation {
            control.machine.record_heartbeat_ack(Instant::now());
        }
    }

    /// Route `envelope` unless the driver went stale. Returns `false` when stale.
    fn dispatch(&self, generation: u64, envelope: &IncomingEnvelope) -> bool {
        let _gate = lock(&self.dispatch_gate);
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        let _scope = CallbackScope::enter();
        if self.router.route(envelope) == 0 {
            debug!(kind = %envelope.kind, "No handler for message type");
        }
        true
    }

    fn clear_outbound(&self, generation: u64) {
        let mut outbound = lock(&self.outbound);
        if outbound.as_ref().is_some_and(|o| o.generation == generation) {
            *outbound = None;
        }
    }
}

async fn close_gracefully(sink: &mut FrameSink) {
    let close = async {
        sink.send(ClientFrame::Close(Some(CloseReason::Normal.code()))).await?;
        sink.close().await?;
        Ok::<(), ClientError>(())
    };
    if let Err(e) = timeout(CLOSE_GRACE, close).await.unwrap_or(Ok(())) {
        debug!(error = %e, "Close frame not delivered");
    }
}

fn log_close(code: Option<u16>) {
    match code.and_then(CloseReason::from_code) {
        Some(reason) => info!(code = reason.code(), reason = reason.as_str(), "Server closed connection"),
        None => info!(?code, "Server closed connection"),
    }
}
