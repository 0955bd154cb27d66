//! Client tuning knobs.

use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::ClientError;

/// Shortest heartbeat or handshake timer the manager will run.
pub const MIN_TIMER: Duration = Duration::from_millis(100);

/// Reconnect, heartbeat and handshake settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Upper bound on any reconnect delay.
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay, in `[0, 1]`.
    pub jitter: f64,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Interval between client pings while open.
    pub heartbeat_interval: Duration,
    /// Inbound silence after which the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Time allowed to connect and receive `connection_established`.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            max_attempts: Some(10),
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Backoff policy derived from these settings.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.max_delay, self.jitter)
    }

    /// Checks internal consistency of the settings.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.heartbeat_interval < MIN_TIMER {
            return Err(ClientError::InvalidConfig(format!(
                "heartbeat_interval must be at least {MIN_TIMER:?}"
            )));
        }
        if self.heartbeat_timeout < self.heartbeat_interval {
            return Err(ClientError::InvalidConfig(
                "heartbeat_timeout must not be shorter than heartbeat_interval".to_string(),
            ));
        }
        if self.handshake_timeout < MIN_TIMER {
            return Err(ClientError::InvalidConfig(format!(
                "handshake_timeout must be at least {MIN_TIMER:?}"
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(ClientError::InvalidConfig(
                "base_delay must not exceed max_delay".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ClientError::InvalidConfig(
                "jitter must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// The same settings with every out-of-range value pulled into range.
    pub fn clamped(mut self) -> Self {
        self.heartbeat_interval = self.heartbeat_interval.max(MIN_TIMER);
        self.heartbeat_timeout = self.heartbeat_timeout.max(self.heartbeat_interval);
        self.handshake_timeout = self.handshake_timeout.max(MIN_TIMER);
        self.max_delay = self.max_delay.max(self.base_delay);
        self.jitter = if self.jitter.is_nan() {
            0.0
        } else {
            self.jitter.clamp(0.0, 1.0)
        };
        self
    }
}
