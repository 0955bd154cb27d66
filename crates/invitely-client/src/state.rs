//! Client reconnect state machine.
//!
//! ```text
//! IDLE --connect()--> CONNECTING --handshake ok--> OPEN
//! CONNECTING --handshake fail / timeout--> RECONNECTING
//! OPEN --heartbeat timeout / transport close--> RECONNECTING
//! RECONNECTING --attempts exhausted--> FAILED   (no backoff is scheduled)
//! RECONNECTING --backoff elapsed--> CONNECTING
//! any --disconnect()--> IDLE
//! FAILED --retry()--> CONNECTING
//! ```
//!
//! The machine is pure: it computes the next state and the pending backoff
//! delay, and the manager acts on them.

use std::time::Duration;

use tokio::time::Instant;

use crate::backoff::BackoffPolicy;
use crate::error::ClientError;

/// Connection status shown to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Not connected and not trying to.
    Idle,
    /// Transport or handshake in progress.
    Connecting,
    /// Handshake complete, messages flowing.
    Open,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Gave up after too many consecutive failures.
    Failed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// Application asked to connect.
    Connect,
    /// `connection_established` received.
    HandshakeSucceeded,
    /// Connect failed, was refused or timed out.
    HandshakeFailed,
    /// No inbound traffic within the heartbeat timeout.
    HeartbeatTimedOut,
    /// The transport closed or errored.
    TransportClosed,
    /// The backoff delay passed.
    BackoffElapsed,
    /// A failure left no attempts to schedule.
    AttemptsExhausted,
    /// Application asked to disconnect.
    Disconnect,
    /// Application asked to try again after a failure.
    Retry,
}

/// State, attempt counter and pending delay for one logical subscription.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    state: ClientState,
    attempt: u32,
    pending_delay: Option<Duration>,
    last_heartbeat_ack: Option<Instant>,
    policy: BackoffPolicy,
    max_attempts: Option<u32>,
}

impl ReconnectState {
    /// A fresh machine in `Idle`.
    pub fn new(policy: BackoffPolicy, max_attempts: Option<u32>) -> Self {
        Self {
            state: ClientState::Idle,
            attempt: 0,
            pending_delay: None,
            last_heartbeat_ack: None,
            policy,
            max_attempts,
        }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Consecutive failures since the last `Open`.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the machine is `Reconnecting` with no attempt left, so the
    /// only way on is [`ClientEvent::AttemptsExhausted`].
    pub fn is_exhausted(&self) -> bool {
        self.state == ClientState::Reconnecting && self.pending_delay.is_none()
    }

    /// Delay to wait while `Reconnecting`.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending_delay
    }

    /// When the last `pong` arrived.
    pub fn last_heartbeat_ack(&self) -> Option<Instant> {
        self.last_heartbeat_ack
    }

    /// Record a `pong`.
    pub fn record_heartbeat_ack(&mut self, at: Instant) {
        self.last_heartbeat_ack = Some(at);
    }

    /// Apply `event`. `jitter_sample` in `[-1, 1]` is used when a failure
    /// schedules a reconnect.
    pub fn apply(&mut self, event: ClientEvent, jitter_sample: f64) -> Result<ClientState, ClientError> {
        use ClientEvent as E;
        use ClientState as S;

        let next = match (self.state, event) {
            (_, E::Disconnect) => {
                self.reset();
                S::Idle
            }
            (S::Idle, E::Connect) => S::Connecting,
            (S::Connecting, E::HandshakeSucceeded) => {
                self.reset();
                S::Open
            }
            (S::Connecting, E::HandshakeFailed | E::TransportClosed | E::HeartbeatTimedOut)
            | (S::Open, E::HeartbeatTimedOut | E::TransportClosed) => self.fail(jitter_sample),
            (S::Reconnecting, E::AttemptsExhausted) if self.pending_delay.is_none() => S::Failed,
            (S::Reconnecting, E::BackoffElapsed) if self.pending_delay.is_some() => {
                self.pending_delay = None;
                S::Connecting
            }
            (S::Failed, E::Retry) => {
                self.reset();
                S::Connecting
            }
            (from, event) => return Err(ClientError::InvalidTransition { from, event }),
        };
        self.state = next;
        Ok(next)
    }

    fn fail(&mut self, jitter_sample: f64) -> ClientState {
        if self.max_attempts.is_some_and(|max| self.attempt >= max) {
            self.pending_delay = None;
            return ClientState::Reconnecting;
        }
        self.pending_delay = Some(self.policy.delay(self.attempt, jitter_sample));
        self.attempt = self.attempt.saturating_add(1);
        ClientState::Reconnecting
    }

    fn reset(&mut self) {
        self.attempt = 0;
        self.pending_delay = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(max_attempts: Option<u32>) -> ReconnectState {
        ReconnectState::new(
            BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 0.2),
            max_attempts,
        )
    }

    fn fail_once(m: &mut ReconnectState) -> ClientState {
        assert_eq!(
            m.apply(ClientEvent::HandshakeFailed, 0.0).unwrap(),
            ClientState::Reconnecting
        );
        if m.is_exhausted() {
            m.apply(ClientEvent::AttemptsExhausted, 0.0).unwrap()
        } else {
            m.apply(ClientEvent::BackoffElapsed, 0.0).unwrap();
            ClientState::Reconnecting
        }
    }

    #[test]
    fn test_happy_path() {
        let mut m = machine(Some(3));
        assert_eq!(m.apply(ClientEvent::Connect, 0.0).unwrap(), ClientState::Connecting);
        assert_eq!(m.apply(ClientEvent::HandshakeSucceeded, 0.0).unwrap(), ClientState::Open);
        assert_eq!(m.apply(ClientEvent::Disconnect, 0.0).unwrap(), ClientState::Idle);
    }

    #[test]
    fn test_delays_grow_then_reset_after_open() {
        let mut m = machine(None);
        m.apply(ClientEvent::Connect, 0.0).unwrap();
        let mut delays = Vec::new();
        for _ in 0..4 {
            m.apply(ClientEvent::HandshakeFailed, 0.0).unwrap();
            delays.push(m.pending_delay().unwrap().as_secs());
            m.apply(ClientEvent::BackoffElapsed, 0.0).unwrap();
        }
        assert_eq!(delays, vec![1, 2, 4, 8]);

        m.apply(ClientEvent::HandshakeSucceeded, 0.0).unwrap();
        assert_eq!(m.attempt(), 0);
        m.apply(ClientEvent::TransportClosed, 0.0).unwrap();
        assert_eq!(m.pending_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exhaustion_then_retry() {
        let mut m = machine(Some(2));
        m.apply(ClientEvent::Connect, 0.0).unwrap();
        assert_eq!(fail_once(&mut m), ClientState::Reconnecting);
        assert_eq!(fail_once(&mut m), ClientState::Reconnecting);
        assert_eq!(fail_once(&mut m), ClientState::Failed);
        assert_eq!(m.state(), ClientState::Failed);

        assert_eq!(m.apply(ClientEvent::Retry, 0.0).unwrap(), ClientState::Connecting);
        assert_eq!(m.attempt(), 0);
    }

    #[test]
    fn test_open_with_no_attempts_allowed_fails_via_reconnecting() {
        let mut m = machine(Some(0));
        m.apply(ClientEvent::Connect, 0.0).unwrap();
        m.apply(ClientEvent::HandshakeSucceeded, 0.0).unwrap();

        assert_eq!(
            m.apply(ClientEvent::TransportClosed, 0.0).unwrap(),
            ClientState::Reconnecting
        );
        assert!(m.is_exhausted());
        assert!(m.apply(ClientEvent::BackoffElapsed, 0.0).is_err());
        assert_eq!(
            m.apply(ClientEvent::AttemptsExhausted, 0.0).unwrap(),
            ClientState::Failed
        );
    }

    #[test]
    fn test_exhausted_event_rejected_while_attempts_remain() {
        let mut m = machine(Some(3));
        m.apply(ClientEvent::Connect, 0.0).unwrap();
        m.apply(ClientEvent::HandshakeFailed, 0.0).unwrap();
        assert!(!m.is_exhausted());
        assert!(m.apply(ClientEvent::AttemptsExhausted, 0.0).is_err());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut m = machine(None);
        assert!(m.apply(ClientEvent::HandshakeSucceeded, 0.0).is_err());
        assert!(m.apply(ClientEvent::Retry, 0.0).is_err());
        m.apply(ClientEvent::Connect, 0.0).unwrap();
        assert!(m.apply(ClientEvent::Connect, 0.0).is_err());
        assert_eq!(m.state(), ClientState::Connecting);
    }
}
