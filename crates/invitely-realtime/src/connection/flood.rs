//! Consecutive parse-failure guard.

/// Counts consecutive malformed inbound messages on one connection.
#[derive(Debug, Clone)]
pub struct FloodGuard {
    limit: u32,
    consecutive: u32,
}

impl FloodGuard {
    /// Create a guard that trips on the `limit`-th consecutive failure.
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    /// Record a malformed message. Returns `true` once the limit is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive >= self.limit
    }

    /// A well-formed message clears the streak.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Current streak length.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
