//! In-memory pub/sub for single-node deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use invitely_core::protocol::NotificationMessage;
use invitely_core::result::AppResult;

use super::{BusSubscription, EventBus};

/// In-memory pub/sub implementation.
#[derive(Debug)]
pub struct MemoryPubSub {
    /// Topic name → broadcast sender
    topics: RwLock<HashMap<String, broadcast::Sender<NotificationMessage>>>,
    /// Buffer size for topics
    buffer_size: usize,
}

impl MemoryPubSub {
    /// Create a new in-memory pub/sub
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Number of topics with state held.
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}

#[async_trait]
impl EventBus for MemoryPubSub {
    async fn publish(&self, topic: &str, message: &NotificationMessage) -> AppResult<usize> {
        let topics = self.topics.read().await;
        let Some(tx) = topics.get(topic) else {
            return Ok(0);
        };
        // An error only means nobody is listening right now.
        Ok(tx.send(message.clone()).unwrap_or(0))
    }

    async fn subscribe(&self, topic: &str) -> AppResult<BusSubscription> {
        let rx = {
            let mut topics = self.topics.write().await;
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.buffer_size).0)
                .subscribe()
        };

        let topic = topic.to_string();
        let stream = futures::stream::unfold((rx, topic), |(mut rx, topic)| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, (rx, topic))),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %topic, skipped, "Bus subscriber lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn release(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if topics.get(topic).is_some_and(|tx| tx.receiver_count() == 0) {
            topics.remove(topic);
            tracing::debug!(topic = %topic, "Dropped idle bus topic");
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
