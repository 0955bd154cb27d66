//! Customer-account domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events related to customer accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserEvent {
    /// A customer completed registration.
    Registered {
        /// The user ID.
        user_id: String,
        /// The username.
        username: String,
        /// The email address, if provided.
        email: Option<String>,
        /// When the account was created.
        registered_at: DateTime<Utc>,
    },
}
