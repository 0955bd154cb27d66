//! Decides when a membership change becomes an `admin_joined` or
//! `admin_left` announcement.

use invitely_core::config::PresenceMode;
use invitely_core::protocol::PresencePayload;

use crate::connection::handle::ConnectionHandle;
use crate::registry::{JoinOutcome, LeaveOutcome};

/// Turns registry outcomes into presence payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceTracker {
    mode: PresenceMode,
}

impl PresenceTracker {
    /// Create a tracker with the given counting policy.
    pub fn new(mode: PresenceMode) -> Self {
        Self { mode }
    }

    /// Counting policy in effect.
    pub fn mode(&self) -> PresenceMode {
        self.mode
    }

    /// Payload for `admin_joined`, if this join should be announced.
    pub fn on_join(
        &self,
        handle: &ConnectionHandle,
        group: &str,
        outcome: &JoinOutcome,
    ) -> Option<PresencePayload> {
        if !outcome.changed {
            return None;
        }
        if self.mode == PresenceMode::PerPrincipal && !outcome.first_for_principal {
            return None;
        }
        Some(PresencePayload {
            principal_id: handle.principal.id.clone(),
            name: handle.principal.name.clone(),
            group: group.to_string(),
            admin_count: outcome.principal_count,
            connection_count: outcome.connection_count,
        })
    }

    /// Payload for `admin_left`, if this departure should be announced.
    pub fn on_leave(
        &self,
        handle: &ConnectionHandle,
        group: &str,
        outcome: &LeaveOutcome,
    ) -> Option<PresencePayload> {
        if !outcome.changed {
            return None;
        }
        if self.mode == PresenceMode::PerPrincipal && !outcome.last_for_principal {
            return None;
        }
        Some(PresencePayload {
            principal_id: handle.principal.id.clone(),
            name: handle.principal.name.clone(),
            group: group.to_string(),
            admin_count: outcome.principal_count,
            connection_count: outcome.connection_count,
        })
    }
}
