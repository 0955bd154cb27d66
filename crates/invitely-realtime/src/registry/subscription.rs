//! Reverse index from connection to the groups it belongs to.

use std::collections::HashSet;

use dashmap::DashMap;

use invitely_core::types::ConnectionId;

/// Tracks connection-to-group memberships.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    conn_to_groups: DashMap<ConnectionId, HashSet<String>>,
}

impl SubscriptionTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a membership.
    pub fn add(&self, conn_id: ConnectionId, group: &str) {
        self.conn_to_groups
            .entry(conn_id)
            .or_default()
            .insert(group.to_string());
    }

    /// Removes a membership.
    pub fn remove(&self, conn_id: ConnectionId, group: &str) {
        let emptied = match self.conn_to_groups.get_mut(&conn_id) {
            Some(mut groups) => {
                groups.remove(group);
                groups.is_empty()
            }
            None => false,
        };
        if emptied {
            self.conn_to_groups
                .remove_if(&conn_id, |_, groups| groups.is_empty());
        }
    }

    /// Groups a connection belongs to.
    pub fn groups_of(&self, conn_id: ConnectionId) -> HashSet<String> {
        self.conn_to_groups
            .get(&conn_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Removes and returns every membership of a connection.
    pub fn remove_all(&self, conn_id: ConnectionId) -> HashSet<String> {
        self.conn_to_groups
            .remove(&conn_id)
            .map(|(_, groups)| groups)
            .unwrap_or_default()
    }
}
