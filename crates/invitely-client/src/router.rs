//! Routes inbound envelopes to callbacks by message type.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use invitely_core::protocol::{IncomingEnvelope, MessageType};

/// Callback invoked with a raw envelope.
pub type Callback = Arc<dyn Fn(&IncomingEnvelope) + Send + Sync>;

/// Type-keyed callback table. Unknown types have no handlers and are ignored.
#[derive(Default)]
pub struct MessageRouter {
    handlers: RwLock<HashMap<String, Vec<Callback>>>,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self
            .handlers
            .read()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("MessageRouter").field("kinds", &kinds).finish()
    }
}

impl MessageRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for envelopes whose `type` is `kind`.
    pub fn on_raw<F>(&self, kind: impl Into<String>, callback: F)
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.entry(kind.into()).or_default().push(Arc::new(callback));
        }
    }

    /// Register a callback receiving the decoded `data` of `kind` messages.
    ///
    /// Payloads that fail to decode are logged and skipped.
    pub fn on<T, F>(&self, kind: MessageType, callback: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.on_raw(kind.as_str(), move |envelope: &IncomingEnvelope| {
            match envelope.payload::<T>() {
                Ok(payload) => callback(payload),
                Err(e) => tracing::warn!(kind = %envelope.kind, error = %e, "Undecodable payload skipped"),
            }
        });
    }

    /// Callbacks registered for `kind`, cloned out of the table so they can
    /// run without holding the lock.
    pub fn handlers_for(&self, kind: &str) -> Vec<Callback> {
        self.handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(kind).cloned())
            .unwrap_or_default()
    }

    /// Invoke every callback registered for the envelope's type. Returns
    /// how many ran.
    pub fn route(&self, envelope: &IncomingEnvelope) -> usize {
        let handlers = self.handlers_for(&envelope.kind);
        for handler in &handlers {
            handler(envelope);
        }
        handlers.len()
    }

    /// Drop every registered callback.
    pub fn clear(&self) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.clear();
        }
    }
}
