//! Per-group relay from the bus to connection queues.
//!
//! One relay task per active group subscribes to the group's topic and hands each
//! message to every member's outbound queue. The message is serialized once
//! and shared. Queues are never awaited: a member whose queue is full is
//! disconnected as a slow consumer. Relays are reference counted through
//! [`RelayLease`]s and stop once their group has no connections left.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use invitely_core::error::AppError;
use invitely_core::result::AppResult;

use crate::connection::handle::{ConnectionHandle, DeliveryOutcome};
use crate::connection::state::{ConnectionState, TeardownReason};
use crate::metrics::RealtimeMetrics;
use crate::registry::SessionRegistry;

use super::{BusSubscription, EventBus};

/// Delay before resubscribing after the bus stream ends.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on a single bus subscribe during a handshake.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct RelayEntry {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    holders: usize,
}

impl RelayEntry {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Owns the relay tasks, one per group with at least one lease holder.
#[derive(Debug)]
pub struct GroupFanout {
    bus: Arc<dyn EventBus>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<RealtimeMetrics>,
    relays: Mutex<HashMap<String, RelayEntry>>,
    cancel: CancellationToken,
}

/// Keeps a group's relay running. The relay stops, and its bus topic is
/// released, when the last lease for the group is dropped.
#[derive(Debug)]
#[must_use = "the group relay stops when the lease is dropped"]
pub struct RelayLease {
    fanout: Arc<GroupFanout>,
    group: String,
}

impl RelayLease {
    /// Group this lease keeps relayed.
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl Drop for RelayLease {
    fn drop(&mut self) {
        self.fanout.release(&self.group);
    }
}

impl GroupFanout {
    /// Creates a fanout with no relays running.
    pub fn new(
        bus: Arc<dyn EventBus>,
        registry: Arc<SessionRegistry>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            bus,
            registry,
            metrics,
            relays: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn relays(&self) -> MutexGuard<'_, HashMap<String, RelayEntry>> {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a lease on `group`'s relay, starting it if needed. The bus
    /// subscription is in place when this returns.
    ///
    /// The relay table is never locked across the bus subscribe, so a slow
    /// backbone only delays handshakes for groups that have no relay yet.
    pub async fn acquire(self: &Arc<Self>, group: &str) -> AppResult<RelayLease> {
        if self.join_live(group) {
            return Ok(self.lease(group));
        }

        let subscription = tokio::time::timeout(SUBSCRIBE_TIMEOUT, self.bus.subscribe(group))
            .await
            .map_err(|_| AppError::external(format!("Subscribing to group '{group}' timed out")))??;

        let mut relays = self.relays();
        if relays.get(group).is_some_and(RelayEntry::is_live) {
            // Another handshake started the relay while we were subscribing.
            if let Some(entry) = relays.get_mut(group) {
                entry.holders += 1;
            }
        } else {
            let holders = relays.remove(group).map_or(0, |stale| stale.holders) + 1;
            let cancel = self.cancel.child_token();
            let relay = Relay {
                group: group.to_string(),
                bus: self.bus.clone(),
                registry: self.registry.clone(),
                metrics: self.metrics.clone(),
                cancel: cancel.clone(),
            };
            relays.insert(
                group.to_string(),
                RelayEntry {
                    task: tokio::spawn(relay.run(subscription)),
                    cancel,
                    holders,
                },
            );
            info!(group = %group, bus = self.bus.name(), "Started group relay");
        }
        drop(relays);
        Ok(self.lease(group))
    }

    fn join_live(&self, group: &str) -> bool {
        match self.relays().get_mut(group) {
            Some(entry) if entry.is_live() => {
                entry.holders += 1;
                true
            }
            _ => false,
        }
    }

    fn lease(self: &Arc<Self>, group: &str) -> RelayLease {
        RelayLease {
            fanout: Arc::clone(self),
            group: group.to_string(),
        }
    }

    fn release(&self, group: &str) {
        let mut relays = self.relays();
        let Some(entry) = relays.get_mut(group) else {
            return;
        };
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders > 0 {
            return;
        }
        if let Some(entry) = relays.remove(group) {
            entry.cancel.cancel();
            info!(group = %group, "Stopped idle group relay");
        }
    }

    /// Number of running relays.
    pub fn relay_count(&self) -> usize {
        self.relays().values().filter(|entry| entry.is_live()).count()
    }

    /// Stop every relay.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let relays: Vec<_> = self.relays().drain().collect();
        for (group, entry) in relays {
            if tokio::time::timeout(Duration::from_secs(1), entry.task).await.is_err() {
                warn!(group = %group, "Relay did not stop in time");
            }
        }
    }
}

struct Relay {
    group: String,
    bus: Arc<dyn EventBus>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<RealtimeMetrics>,
    cancel: CancellationToken,
}

impl Relay {
    async fn run(self, mut subscription: BusSubscription) {
        loop {
            self.pump(&mut subscription).await;
            if self.cancel.is_cancelled() {
                break;
            }

            warn!(group = %self.group, "Bus subscription ended, resubscribing");
            match self.resubscribe().await {
                Some(next) => subscription = next,
                None => break,
            }
        }
        drop(subscription);
        self.bus.release(&self.group).await;
        debug!(group = %self.group, "Relay stopped");
    }

    async fn resubscribe(&self) -> Option<BusSubscription> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
            match self.bus.subscribe(&self.group).await {
                Ok(subscription) => return Some(subscription),
                Err(e) => error!(group = %self.group, error = %e, "Resubscribe failed"),
            }
        }
    }

    async fn pump(&self, subscription: &mut BusSubscription) {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return,
                next = subscription.next() => match next {
                    Some(message) => message,
                    None => return,
                },
            };

            let text: Arc<str> = match message.to_json() {
                Ok(json) => Arc::from(json),
                Err(e) => {
                    error!(group = %self.group, error = %e, "Failed to serialize broadcast");
                    continue;
                }
            };

            let members = self.registry.handles_of(&self.group);
            let mut queued = 0u64;
            for handle in &members {
                if self.deliver(handle, text.clone()) {
                    queued += 1;
                }
            }
            self.metrics.messages_sent(queued);
            debug!(
                group = %self.group,
                kind = %message.kind,
                members = members.len(),
                queued,
                "Relayed broadcast"
            );
        }
    }

    fn deliver(&self, handle: &ConnectionHandle, text: Arc<str>) -> bool {
        match handle.deliver(text) {
            DeliveryOutcome::Queued => true,
            DeliveryOutcome::Overflow => {
                warn!(conn_id = %handle.id, group = %self.group, "Send buffer full, disconnecting slow consumer");
                self.metrics.slow_consumer();
                handle.request_close(TeardownReason::SlowConsumer);
                false
            }
            DeliveryOutcome::Closed => {
                if handle.state() == ConnectionState::Open {
                    handle.request_close(TeardownReason::TransportError);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryPubSub;
    use crate::connection::authenticator::Principal;
    use crate::connection::transport::OutboundFrame;
    use invitely_core::protocol::{MessageType, NotificationMessage};
    use invitely_core::types::{PrincipalId, UserRole};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        bus: Arc<MemoryPubSub>,
        registry: Arc<SessionRegistry>,
        fanout: Arc<GroupFanout>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(MemoryPubSub::new(64));
        let registry = Arc::new(SessionRegistry::new());
        let fanout = Arc::new(GroupFanout::new(
            bus.clone(),
            registry.clone(),
            Arc::new(RealtimeMetrics::new()),
        ));
        Fixture { bus, registry, fanout }
    }

    fn member(
        registry: &SessionRegistry,
        group: &str,
        buffer: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = Arc::new(ConnectionHandle::new(
            Principal {
                id: PrincipalId::new(format!("p-{group}")),
                role: UserRole::Staff,
                name: None,
            },
            group,
            tx,
        ));
        handle.set_state(ConnectionState::Open);
        registry.register(handle.clone());
        registry.join(group, handle.id).unwrap();
        (handle, rx)
    }

    fn text(frame: Option<OutboundFrame>) -> serde_json::Value {
        match frame {
            Some(OutboundFrame::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_group_members_in_order() {
        let f = fixture();
        let (_a, mut rx_a) = member(&f.registry, "g1", 16);
        let (_b, mut rx_b) = member(&f.registry, "g2", 16);
        let _g1 = f.fanout.acquire("g1").await.unwrap();
        let _g2 = f.fanout.acquire("g2").await.unwrap();

        for n in 0..3 {
            let msg = NotificationMessage::new(MessageType::NewUser, json!({ "n": n }));
            f.bus.publish("g1", &msg).await.unwrap();
        }
        for n in 0..3 {
            assert_eq!(text(rx_a.recv().await)["data"]["n"], n);
        }

        let marker = NotificationMessage::new(MessageType::OrderUpdate, json!({ "n": 99 }));
        f.bus.publish("g2", &marker).await.unwrap();
        let first_for_b = text(rx_b.recv().await);
        assert_eq!(first_for_b["type"], "order_update");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_lease_shares_the_relay() {
        let f = fixture();
        let _first = f.fanout.acquire("g").await.unwrap();
        let _second = f.fanout.acquire("g").await.unwrap();
        assert_eq!(f.fanout.relay_count(), 1);

        let (_h, mut rx) = member(&f.registry, "g", 16);
        let msg = NotificationMessage::new(MessageType::NewUser, json!({}));
        assert_eq!(f.bus.publish("g", &msg).await.unwrap(), 1);
        text(rx.recv().await);
        f.fanout.shutdown().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_disconnects_slow_consumer() {
        let f = fixture();
        let (slow, _rx) = member(&f.registry, "g", 1);
        let _lease = f.fanout.acquire("g").await.unwrap();

        for _ in 0..2 {
            let msg = NotificationMessage::new(MessageType::NewUser, json!({}));
            f.bus.publish("g", &msg).await.unwrap();
        }
        tokio::time::timeout(Duration::from_secs(1), slow.cancelled())
            .await
            .expect("slow consumer should be asked to close");
        assert_eq!(slow.requested_teardown(), Some(TeardownReason::SlowConsumer));
    }

    #[tokio::test]
    async fn test_relay_stops_after_last_lease_is_dropped() {
        let f = fixture();
        let first = f.fanout.acquire("g").await.unwrap();
        let second = f.fanout.acquire("g").await.unwrap();
        assert_eq!(first.group(), "g");

        drop(first);
        assert_eq!(f.fanout.relay_count(), 1);
        drop(second);
        assert_eq!(f.fanout.relay_count(), 0);

        tokio::time::timeout(Duration::from_secs(1), async {
            while f.bus.topic_count().await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("idle topic should be released");

        // A later lease starts a fresh relay.
        let (_h, mut rx) = member(&f.registry, "g", 16);
        let _again = f.fanout.acquire("g").await.unwrap();
        let msg = NotificationMessage::new(MessageType::NewUser, json!({}));
        assert_eq!(f.bus.publish("g", &msg).await.unwrap(), 1);
        text(rx.recv().await);
    }

    #[tokio::test]
    async fn test_unreachable_bus_fails_acquire_without_leaking() {
        #[derive(Debug)]
        struct DownBus;

        #[async_trait::async_trait]
        impl EventBus for DownBus {
            async fn publish(&self, _topic: &str, _message: &NotificationMessage) -> AppResult<usize> {
                Err(AppError::external("down"))
            }

            async fn subscribe(&self, _topic: &str) -> AppResult<BusSubscription> {
                Err(AppError::external("down"))
            }

            fn name(&self) -> &'static str {
                "down"
            }
        }

        let fanout = Arc::new(GroupFanout::new(
            Arc::new(DownBus),
            Arc::new(SessionRegistry::new()),
            Arc::new(RealtimeMetrics::new()),
        ));
        assert!(fanout.acquire("g").await.is_err());
        assert_eq!(fanout.relay_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscribe_times_out_without_blocking_other_groups() {
        #[derive(Debug)]
        struct StallingBus(MemoryPubSub);

        #[async_trait::async_trait]
        impl EventBus for StallingBus {
            async fn publish(&self, topic: &str, message: &NotificationMessage) -> AppResult<usize> {
                self.0.publish(topic, message).await
            }

            async fn subscribe(&self, topic: &str) -> AppResult<BusSubscription> {
                if topic == "stuck" {
                    std::future::pending::<()>().await;
                }
                self.0.subscribe(topic).await
            }

            fn name(&self) -> &'static str {
                "stalling"
            }
        }

        let fanout = Arc::new(GroupFanout::new(
            Arc::new(StallingBus(MemoryPubSub::new(8))),
            Arc::new(SessionRegistry::new()),
            Arc::new(RealtimeMetrics::new()),
        ));
        let stuck = tokio::spawn({
            let fanout = fanout.clone();
            async move { fanout.acquire("stuck").await.map(drop) }
        });
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        let _lease = fanout.acquire("g").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let result = stuck.await.unwrap();
        assert!(result.is_err());
        assert_eq!(fanout.relay_count(), 1);
    }
}
