//! Heartbeat supervision for WebSocket keepalive.
//!
//! Clients send `ping`; the server answers `pong` and records the time. The
//! supervisor checks the silence on every tick and returns once it exceeds
//! the timeout, so a dead connection is detected within
//! `(timeout, timeout + interval]` of its last heartbeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use invitely_core::config::RealtimeConfig;

use super::handle::ConnectionHandle;

/// Heartbeat configuration.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Interval between liveness checks.
    pub interval: Duration,
    /// Silence after which the connection is considered dead.
    pub timeout: Duration,
}

impl From<&RealtimeConfig> for HeartbeatConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
        }
    }
}

/// Resolve once `handle` has been silent for longer than the timeout.
///
/// Cancellation is the caller's job: drop the future when the connection
/// ends for another reason.
pub async fn supervise(handle: Arc<ConnectionHandle>, config: HeartbeatConfig) -> Duration {
    let mut ticker = time::interval_at(time::Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let silence = handle.since_last_heartbeat();
        if silence > config.timeout {
            tracing::warn!(
                conn_id = %handle.id,
                silence_ms = silence.as_millis() as u64,
                "Heartbeat timeout"
            );
            return silence;
        }
    }
}
