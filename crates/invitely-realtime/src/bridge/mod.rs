//! Pub/sub backbone between the broadcast dispatcher and connection tasks.
//!
//! Topics are group names. Delivery is at-most-once and fire-and-forget.
//! Per-subscriber FIFO holds for a single publisher only when the backbone
//! itself preserves producer order, which both bundled backends do.

pub mod fanout;
pub mod memory_pubsub;
pub mod redis_pubsub;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use invitely_core::config::{BusConfig, BusProvider};
use invitely_core::error::AppError;
use invitely_core::protocol::NotificationMessage;
use invitely_core::result::AppResult;

pub use fanout::{GroupFanout, RelayLease};
pub use memory_pubsub::MemoryPubSub;
pub use redis_pubsub::RedisPubSub;

/// Stream of messages published on one topic.
pub type BusSubscription = BoxStream<'static, NotificationMessage>;

/// Abstract pub/sub backbone.
#[async_trait]
pub trait EventBus: Send + Sync + std::fmt::Debug {
    /// Publish `message` on `topic`.
    ///
    /// Returns how many subscribers the backbone handed it to; zero is not
    /// an error. Fails only when the backbone itself is unreachable.
    async fn publish(&self, topic: &str, message: &NotificationMessage) -> AppResult<usize>;

    /// Subscribe to `topic`. The stream ends when the backbone goes away.
    async fn subscribe(&self, topic: &str) -> AppResult<BusSubscription>;

    /// Drop per-topic state once the last subscriber of `topic` is gone.
    ///
    /// Backends whose subscriptions own their resources need nothing here.
    async fn release(&self, _topic: &str) {}

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the configured backbone.
pub async fn build_event_bus(config: &BusConfig, buffer_size: usize) -> AppResult<Arc<dyn EventBus>> {
    match config.provider {
        BusProvider::Memory => Ok(Arc::new(MemoryPubSub::new(buffer_size))),
        BusProvider::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| AppError::configuration("bus.redis_url is required for the redis provider"))?;
            let bus = RedisPubSub::connect(url, &config.key_prefix).await?;
            Ok(Arc::new(bus))
        }
    }
}
