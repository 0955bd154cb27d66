//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use invitely_core::config::RealtimeConfig;
use invitely_core::result::AppResult;

use crate::bridge::{EventBus, GroupFanout};
use crate::connection::authenticator::TokenAuthenticator;
use crate::connection::manager::ConnectionManager;
use crate::connection::state::TeardownReason;
use crate::metrics::{MetricsSnapshot, RealtimeMetrics};
use crate::notification::dispatcher::BroadcastDispatcher;
use crate::registry::SessionRegistry;
use crate::snapshot::SnapshotProvider;

/// Central real-time engine that coordinates all WebSocket subsystems.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Session registry.
    pub registry: Arc<SessionRegistry>,
    /// Broadcast dispatcher, handed to business logic.
    pub dispatcher: BroadcastDispatcher,
    /// Per-group bus relays.
    pub fanout: Arc<GroupFanout>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    bus: Arc<dyn EventBus>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("bus", &self.bus.name())
            .finish()
    }
}

/// Live membership of one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    /// Group name.
    pub name: String,
    /// Open connections.
    pub connections: usize,
    /// Distinct administrators.
    pub admins: usize,
}

/// Engine overview served on the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Bus backend in use.
    pub bus: &'static str,
    /// Registered connections.
    pub connections: usize,
    /// Non-empty groups.
    pub groups: Vec<GroupStats>,
    /// Counters.
    pub metrics: MetricsSnapshot,
}

impl RealtimeEngine {
    /// Creates a new real-time engine with all subsystems.
    pub fn new(
        config: RealtimeConfig,
        bus: Arc<dyn EventBus>,
        authenticator: Arc<dyn TokenAuthenticator>,
        snapshots: Arc<dyn SnapshotProvider>,
    ) -> Self {
        let metrics = Arc::new(RealtimeMetrics::new());
        let registry = Arc::new(SessionRegistry::new());
        let fanout = Arc::new(GroupFanout::new(bus.clone(), registry.clone(), metrics.clone()));
        let dispatcher =
            BroadcastDispatcher::new(bus.clone(), metrics.clone(), config.default_group.clone());
        Self::assemble(config, bus, authenticator, snapshots, registry, fanout, dispatcher, metrics)
    }

    /// Like [`new`](Self::new), but the dispatcher keeps `tracker` up to date
    /// from the events it publishes.
    pub fn with_tracked_snapshot(
        config: RealtimeConfig,
        bus: Arc<dyn EventBus>,
        authenticator: Arc<dyn TokenAuthenticator>,
        tracker: Arc<crate::snapshot::InMemorySnapshotProvider>,
    ) -> Self {
        let metrics = Arc::new(RealtimeMetrics::new());
        let registry = Arc::new(SessionRegistry::new());
        let fanout = Arc::new(GroupFanout::new(bus.clone(), registry.clone(), metrics.clone()));
        let dispatcher =
            BroadcastDispatcher::new(bus.clone(), metrics.clone(), config.default_group.clone())
                .with_snapshot_tracking(tracker.clone());
        Self::assemble(config, bus, authenticator, tracker, registry, fanout, dispatcher, metrics)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: RealtimeConfig,
        bus: Arc<dyn EventBus>,
        authenticator: Arc<dyn TokenAuthenticator>,
        snapshots: Arc<dyn SnapshotProvider>,
        registry: Arc<SessionRegistry>,
        fanout: Arc<GroupFanout>,
        dispatcher: BroadcastDispatcher,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(
            config,
            registry.clone(),
            fanout.clone(),
            dispatcher.clone(),
            authenticator,
            snapshots,
            metrics.clone(),
        ));

        info!(bus = bus.name(), "Real-time engine initialized");

        Self {
            connections,
            registry,
            dispatcher,
            fanout,
            metrics,
            bus,
        }
    }

    /// Current engine overview.
    pub fn stats(&self) -> EngineStats {
        let mut groups: Vec<GroupStats> = self
            .registry
            .group_names()
            .into_iter()
            .map(|name| GroupStats {
                connections: self.registry.member_count(&name),
                admins: self.registry.principal_count(&name),
                name,
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));

        EngineStats {
            bus: self.bus.name(),
            connections: self.registry.connection_count(),
            groups,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Initiates a graceful shutdown of the real-time engine.
    ///
    /// Every connection is closed with `ServerShutdown`; the call waits up
    /// to `grace` for them to leave the registry before stopping the relays.
    pub async fn shutdown(&self, grace: Duration) -> AppResult<()> {
        info!("Shutting down real-time engine");

        self.connections.close_all(TeardownReason::ServerShutdown);

        let drained = tokio::time::timeout(grace, async {
            while self.registry.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = self.registry.connection_count(),
                "Connections still open after shutdown grace period"
            );
        }

        self.fanout.shutdown().await;
        info!("Real-time engine shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryPubSub;
    use crate::connection::authenticator::JwtAuthenticator;
    use crate::snapshot::InMemorySnapshotProvider;
    use invitely_core::config::AuthConfig;

    fn engine() -> RealtimeEngine {
        RealtimeEngine::with_tracked_snapshot(
            RealtimeConfig::default(),
            Arc::new(MemoryPubSub::new(16)),
            Arc::new(JwtAuthenticator::new(&AuthConfig::default())),
            Arc::new(InMemorySnapshotProvider::new()),
        )
    }

    #[tokio::test]
    async fn test_stats_of_idle_engine() {
        let stats = engine().stats();
        assert_eq!(stats.bus, "memory");
        assert_eq!(stats.connections, 0);
        assert!(stats.groups.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_with_no_connections_returns_quickly() {
        let engine = engine();
        let _lease = engine.fanout.acquire("admin-dashboard").await.unwrap();
        engine.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(engine.fanout.relay_count(), 0);
        assert!(!engine.connections.is_accepting());
    }
}
