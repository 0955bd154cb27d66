//! Broadcast dispatcher: the entry point business logic calls after a
//! state change commits.
//!
//! Publishing is fire-and-forget. Failures are logged and counted but never
//! returned to the caller, so a notification problem cannot fail an order
//! or approval transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use invitely_core::events::{DomainEvent, EventPayload, OrderEvent, UserEvent};
use invitely_core::protocol::{ActivityEntry, ApprovalDecision, MessageType, NotificationMessage};

use crate::bridge::EventBus;
use crate::metrics::RealtimeMetrics;
use crate::snapshot::InMemorySnapshotProvider;

use super::mapper::map_event;

/// What happened to a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the bus; `receivers` subscribers got it.
    Published {
        /// Subscribers reported by the bus.
        receivers: usize,
    },
    /// The payload could not be built or the bus refused it.
    Dropped,
}

/// Maps domain events to notification messages and publishes them.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    bus: Arc<dyn EventBus>,
    metrics: Arc<RealtimeMetrics>,
    default_group: String,
    tracker: Option<Arc<InMemorySnapshotProvider>>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher publishing domain events to `default_group`.
    pub fn new(
        bus: Arc<dyn EventBus>,
        metrics: Arc<RealtimeMetrics>,
        default_group: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            metrics,
            default_group: default_group.into(),
            tracker: None,
        }
    }

    /// Keep `tracker`'s counters in step with dispatched events.
    pub fn with_snapshot_tracking(mut self, tracker: Arc<InMemorySnapshotProvider>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Group domain events are published to.
    pub fn default_group(&self) -> &str {
        &self.default_group
    }

    /// Build a message from a typed payload and publish it to `group`.
    pub async fn publish<T: Serialize>(
        &self,
        group: &str,
        kind: MessageType,
        payload: &T,
    ) -> PublishOutcome {
        match NotificationMessage::with_payload(kind, payload) {
            Ok(message) => self.publish_message(group, &message).await,
            Err(e) => {
                error!(group = %group, kind = %kind, error = %e, "Failed to build notification payload");
                PublishOutcome::Dropped
            }
        }
    }

    /// Publish an already-built message to `group`.
    pub async fn publish_message(&self, group: &str, message: &NotificationMessage) -> PublishOutcome {
        match self.bus.publish(group, message).await {
            Ok(receivers) => {
                self.metrics.notification_published();
                if receivers == 0 {
                    debug!(group = %group, kind = %message.kind, "No subscribers, notification dropped");
                } else {
                    debug!(group = %group, kind = %message.kind, receivers, "Notification published");
                }
                PublishOutcome::Published { receivers }
            }
            Err(e) => {
                self.metrics.publish_failed();
                error!(
                    group = %group,
                    kind = %message.kind,
                    bus = self.bus.name(),
                    error = %e,
                    "Failed to publish notification"
                );
                PublishOutcome::Dropped
            }
        }
    }

    /// Map a domain event and publish it to the default group.
    pub async fn dispatch(&self, event: &DomainEvent) -> PublishOutcome {
        self.track(event).await;
        match map_event(&event.payload) {
            Ok((kind, data)) => {
                let message = NotificationMessage::new(kind, data);
                self.publish_message(&self.default_group, &message).await
            }
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Failed to map domain event");
                PublishOutcome::Dropped
            }
        }
    }

    /// Dispatch on a background task so the caller never waits on the bus.
    pub fn spawn_dispatch(&self, event: DomainEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(&event).await;
        });
    }

    /// A user finished registration.
    pub async fn on_user_registered(
        &self,
        user_id: impl Into<String>,
        username: impl Into<String>,
        email: Option<String>,
        registered_at: DateTime<Utc>,
    ) -> PublishOutcome {
        self.dispatch(&DomainEvent::from(UserEvent::Registered {
            user_id: user_id.into(),
            username: username.into(),
            email,
            registered_at,
        }))
        .await
    }

    /// An order approval was decided.
    pub async fn on_approval_decided(
        &self,
        order_id: impl Into<String>,
        decision: ApprovalDecision,
        decided_by: Option<String>,
        note: Option<String>,
    ) -> PublishOutcome {
        self.dispatch(&DomainEvent::from(OrderEvent::ApprovalDecided {
            order_id: order_id.into(),
            decision,
            decided_by,
            note,
        }))
        .await
    }

    /// The pending-approval count was recomputed.
    pub async fn on_pending_count_changed(&self, pending_count: u64) -> PublishOutcome {
        self.dispatch(&DomainEvent::from(OrderEvent::PendingCountChanged { pending_count }))
            .await
    }

    /// An order was created or changed.
    pub async fn on_order_updated(
        &self,
        order_id: impl Into<String>,
        action: impl Into<String>,
        status: impl Into<String>,
        customer: Option<String>,
        amount_minor: Option<i64>,
    ) -> PublishOutcome {
        self.dispatch(&DomainEvent::from(OrderEvent::Mutated {
            order_id: order_id.into(),
            action: action.into(),
            status: status.into(),
            customer,
            amount_minor,
        }))
        .await
    }

    async fn track(&self, event: &DomainEvent) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        let timestamp = event.occurred_at.timestamp_millis();
        match &event.payload {
            EventPayload::User(UserEvent::Registered { username, .. }) => {
                tracker.record_user().await;
                tracker
                    .record_activity(ActivityEntry {
                        kind: MessageType::NewUser.as_str().to_string(),
                        summary: format!("{username} registered"),
                        timestamp,
                    })
                    .await;
            }
            EventPayload::Order(OrderEvent::ApprovalDecided { order_id, decision, .. }) => {
                if *decision == ApprovalDecision::Approved {
                    tracker.record_approval().await;
                }
                let verb = match decision {
                    ApprovalDecision::Approved => "approved",
                    ApprovalDecision::Rejected => "rejected",
                };
                tracker
                    .record_activity(ActivityEntry {
                        kind: MessageType::ApprovalUpdate.as_str().to_string(),
                        summary: format!("Order {order_id} {verb}"),
                        timestamp,
                    })
                    .await;
            }
            EventPayload::Order(OrderEvent::PendingCountChanged { pending_count }) => {
                tracker.set_pending_count(*pending_count).await;
            }
            EventPayload::Order(OrderEvent::Mutated { order_id, action, .. }) => {
                if action == "created" {
                    tracker.record_order().await;
                }
                tracker
                    .record_activity(ActivityEntry {
                        kind: MessageType::OrderUpdate.as_str().to_string(),
                        summary: format!("Order {order_id} {action}"),
                        timestamp,
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BusSubscription, MemoryPubSub};
    use crate::snapshot::SnapshotProvider;
    use async_trait::async_trait;
    use futures::StreamExt;
    use invitely_core::error::AppError;
    use invitely_core::result::AppResult;

    #[derive(Debug)]
    struct UnreachableBus;

    #[async_trait]
    impl EventBus for UnreachableBus {
        async fn publish(&self, _topic: &str, _message: &NotificationMessage) -> AppResult<usize> {
            Err(AppError::external("connection refused"))
        }

        async fn subscribe(&self, _topic: &str) -> AppResult<BusSubscription> {
            Err(AppError::external("connection refused"))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test]
    async fn test_publish_to_empty_group_is_silent_noop() {
        let metrics = Arc::new(RealtimeMetrics::new());
        let dispatcher = BroadcastDispatcher::new(Arc::new(MemoryPubSub::new(8)), metrics.clone(), "g");
        let outcome = dispatcher.on_pending_count_changed(2).await;
        assert_eq!(outcome, PublishOutcome::Published { receivers: 0 });
        assert_eq!(metrics.snapshot().publish_failures, 0);
    }

    #[tokio::test]
    async fn test_bus_failure_is_swallowed_and_counted() {
        let metrics = Arc::new(RealtimeMetrics::new());
        let dispatcher = BroadcastDispatcher::new(Arc::new(UnreachableBus), metrics.clone(), "g");
        let outcome = dispatcher.on_order_updated("o-1", "created", "pending", None, None).await;
        assert_eq!(outcome, PublishOutcome::Dropped);
        assert_eq!(metrics.snapshot().publish_failures, 1);
    }

    #[tokio::test]
    async fn test_dispatch_targets_default_group() {
        let bus = Arc::new(MemoryPubSub::new(8));
        let mut admin = bus.subscribe("admin-dashboard").await.unwrap();
        let mut other = bus.subscribe("finance").await.unwrap();
        let dispatcher =
            BroadcastDispatcher::new(bus.clone(), Arc::new(RealtimeMetrics::new()), "admin-dashboard");

        dispatcher
            .on_user_registered("u-1", "maria", None, Utc::now())
            .await;
        let message = admin.next().await.unwrap();
        assert_eq!(message.kind, MessageType::NewUser);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), other.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_tracking_updates_snapshot() {
        let tracker = Arc::new(InMemorySnapshotProvider::new());
        let dispatcher = BroadcastDispatcher::new(
            Arc::new(MemoryPubSub::new(8)),
            Arc::new(RealtimeMetrics::new()),
            "g",
        )
        .with_snapshot_tracking(tracker.clone());

        dispatcher.on_pending_count_changed(5).await;
        dispatcher
            .on_approval_decided("o-2", ApprovalDecision::Approved, None, None)
            .await;
        let snapshot = tracker.snapshot().await.unwrap();
        assert_eq!(snapshot.pending_count, 5);
        assert_eq!(snapshot.approved_today, 1);
        assert_eq!(snapshot.recent_activity.len(), 1);
    }
}
