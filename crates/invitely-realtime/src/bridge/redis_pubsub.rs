//! Redis pub/sub backbone for multi-node deployments.
//!
//! Every node publishes to and subscribes from `{key_prefix}{group}`. Redis
//! delivers messages from one connection in the order they were published,
//! which gives per-publisher FIFO to every subscriber. Each subscription
//! owns its pubsub connection, which closes when the subscription is dropped.

#[cfg(feature = "redis-pubsub")]
pub mod implementation {
    use async_trait::async_trait;
    use futures::StreamExt;
    use redis::aio::ConnectionManager;

    use invitely_core::error::AppError;
    use invitely_core::protocol::NotificationMessage;
    use invitely_core::result::AppResult;

    use crate::bridge::{BusSubscription, EventBus};

    /// Redis pub/sub bus.
    #[derive(Clone)]
    pub struct RedisPubSub {
        client: redis::Client,
        publisher: ConnectionManager,
        key_prefix: String,
    }

    impl std::fmt::Debug for RedisPubSub {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisPubSub")
                .field("key_prefix", &self.key_prefix)
                .finish()
        }
    }

    impl RedisPubSub {
        /// Connects to Redis and prepares the publishing connection.
        pub async fn connect(url: &str, key_prefix: &str) -> AppResult<Self> {
            let client = redis::Client::open(url)
                .map_err(|e| AppError::configuration(format!("Invalid Redis URL: {e}")))?;
            let publisher = ConnectionManager::new(client.clone())
                .await
                .map_err(|e| AppError::external(format!("Redis connection failed: {e}")))?;

            tracing::info!(key_prefix = %key_prefix, "Connected Redis pub/sub bus");
            Ok(Self {
                client,
                publisher,
                key_prefix: key_prefix.to_string(),
            })
        }

        fn channel(&self, topic: &str) -> String {
            format!("{}{}", self.key_prefix, topic)
        }
    }

    #[async_trait]
    impl EventBus for RedisPubSub {
        async fn publish(&self, topic: &str, message: &NotificationMessage) -> AppResult<usize> {
            let payload = message.to_json()?;
            let mut conn = self.publisher.clone();
            let receivers = redis::cmd("PUBLISH")
                .arg(self.channel(topic))
                .arg(payload)
                .query_async::<i64>(&mut conn)
                .await
                .map_err(|e| AppError::external(format!("Redis PUBLISH failed: {e}")))?;
            Ok(usize::try_from(receivers).unwrap_or(0))
        }

        async fn subscribe(&self, topic: &str) -> AppResult<BusSubscription> {
            let channel = self.channel(topic);
            let mut pubsub = self
                .client
                .get_async_pubsub()
                .await
                .map_err(|e| AppError::external(format!("Redis connection failed: {e}")))?;
            pubsub
                .subscribe(&channel)
                .await
                .map_err(|e| AppError::external(format!("Redis SUBSCRIBE failed: {e}")))?;

            let stream = pubsub.into_on_message().filter_map(move |msg| {
                let channel = channel.clone();
                async move {
                    let payload: String = match msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "Non-text Redis payload dropped");
                            return None;
                        }
                    };
                    match NotificationMessage::from_json(&payload) {
                        Ok(message) => Some(message),
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "Undecodable Redis message dropped");
                            None
                        }
                    }
                }
            });
            Ok(stream.boxed())
        }

        fn name(&self) -> &'static str {
            "redis"
        }
    }
}

#[cfg(not(feature = "redis-pubsub"))]
pub mod implementation {
    use async_trait::async_trait;

    use invitely_core::error::AppError;
    use invitely_core::protocol::NotificationMessage;
    use invitely_core::result::AppResult;

    use crate::bridge::{BusSubscription, EventBus};

    /// Placeholder used when the `redis-pubsub` feature is disabled.
    #[derive(Debug, Clone)]
    pub struct RedisPubSub;

    impl RedisPubSub {
        /// Always fails: the binary was built without Redis support.
        pub async fn connect(_url: &str, _key_prefix: &str) -> AppResult<Self> {
            Err(AppError::configuration(
                "Redis bus requested but the redis-pubsub feature is not enabled",
            ))
        }
    }

    #[async_trait]
    impl EventBus for RedisPubSub {
        async fn publish(&self, _topic: &str, _message: &NotificationMessage) -> AppResult<usize> {
            Err(AppError::service_unavailable("Redis bus is not compiled in"))
        }

        async fn subscribe(&self, _topic: &str) -> AppResult<BusSubscription> {
            Err(AppError::service_unavailable("Redis bus is not compiled in"))
        }

        fn name(&self) -> &'static str {
            "redis-disabled"
        }
    }
}

pub use implementation::RedisPubSub;
