//! Pub/sub backbone configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which backbone carries notification messages between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusProvider {
    /// In-process broadcast channels (single server process).
    #[default]
    Memory,
    /// Redis pub/sub shared by every server process.
    Redis,
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Backbone provider.
    #[serde(default)]
    pub provider: BusProvider,
    /// Redis connection URL, required when `provider = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Prefix prepended to every Redis channel name.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            provider: BusProvider::Memory,
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl BusConfig {
    /// Checks that the selected provider has what it needs.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.provider == BusProvider::Redis && self.redis_url.is_none() {
            return Err(AppError::configuration(
                "bus.redis_url is required when bus.provider = \"redis\"",
            ));
        }
        Ok(())
    }
}

fn default_key_prefix() -> String {
    "invitely:notify:".to_string()
}
