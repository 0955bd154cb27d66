//! Capped exponential backoff with jitter.

use std::time::Duration;

/// `min(base * 2^attempt, max)`, then spread by `± jitter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for attempt zero.
    pub base: Duration,
    /// Cap applied before and after jitter.
    pub max: Duration,
    /// Spread as a fraction of the nominal delay.
    pub jitter: f64,
}

impl BackoffPolicy {
    /// Creates a policy. `jitter` is clamped to `[0, 1]`.
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
        }
    }

    /// Delay before jitter. Non-decreasing in `attempt` and capped at `max`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay with jitter applied. `sample` in `[-1, 1]` picks the offset.
    pub fn delay(&self, attempt: u32, sample: f64) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let sample = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
        let jittered = nominal.as_secs_f64() * (1.0 + self.jitter * sample);
        Duration::from_secs_f64(jittered.max(0.0)).min(self.max)
    }

}

/// Uniform jitter sample in `[-1, 1]` for [`BackoffPolicy::delay`].
pub fn sample_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random_range(-1.0..=1.0)
}
