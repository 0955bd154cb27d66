//! Dashboard snapshot collaborator.
//!
//! The snapshot populates `connection_established` and answers `get_stats`
//! and `get_pending_count`. The main application owns the real numbers;
//! [`InMemorySnapshotProvider`] keeps a copy fed from domain events so a
//! standalone notification server can answer on its own.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::RwLock;

use invitely_core::protocol::{ActivityEntry, DashboardSnapshot};
use invitely_core::result::AppResult;

/// Source of dashboard figures.
#[async_trait]
pub trait SnapshotProvider: Send + Sync + std::fmt::Debug {
    /// Current dashboard snapshot.
    async fn snapshot(&self) -> AppResult<DashboardSnapshot>;

    /// Current pending-approval count.
    async fn pending_count(&self) -> AppResult<u64> {
        Ok(self.snapshot().await?.pending_count)
    }
}

/// Snapshot kept in memory and updated by the dispatcher.
#[derive(Debug)]
pub struct InMemorySnapshotProvider {
    state: RwLock<State>,
    activity_limit: usize,
}

#[derive(Debug, Default)]
struct State {
    snapshot: DashboardSnapshot,
    activity: VecDeque<ActivityEntry>,
}

impl InMemorySnapshotProvider {
    /// Number of activity entries retained by default.
    pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;

    /// Create an empty provider.
    pub fn new() -> Self {
        Self::with_activity_limit(Self::DEFAULT_ACTIVITY_LIMIT)
    }

    /// Create an empty provider retaining at most `limit` activity entries.
    pub fn with_activity_limit(limit: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            activity_limit: limit,
        }
    }

    /// Replace every counter at once.
    pub async fn replace(&self, snapshot: DashboardSnapshot) {
        let mut state = self.state.write().await;
        state.activity = snapshot.recent_activity.iter().cloned().collect();
        while state.activity.len() > self.activity_limit {
            state.activity.pop_back();
        }
        state.snapshot = snapshot;
    }

    /// Overwrite the pending-approval count.
    pub async fn set_pending_count(&self, pending_count: u64) {
        self.state.write().await.snapshot.pending_count = pending_count;
    }

    /// Count an approval made today.
    pub async fn record_approval(&self) {
        self.state.write().await.snapshot.approved_today += 1;
    }

    /// Count a new user.
    pub async fn record_user(&self) {
        self.state.write().await.snapshot.total_users += 1;
    }

    /// Count a new order.
    pub async fn record_order(&self) {
        self.state.write().await.snapshot.total_orders += 1;
    }

    /// Prepend an activity entry, dropping the oldest past the limit.
    pub async fn record_activity(&self, entry: ActivityEntry) {
        let mut state = self.state.write().await;
        state.activity.push_front(entry);
        state.activity.truncate(self.activity_limit);
    }
}

impl Default for InMemorySnapshotProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotProvider for InMemorySnapshotProvider {
    async fn snapshot(&self) -> AppResult<DashboardSnapshot> {
        let state = self.state.read().await;
        let mut snapshot = state.snapshot.clone();
        snapshot.recent_activity = state.activity.iter().cloned().collect();
        Ok(snapshot)
    }
}
