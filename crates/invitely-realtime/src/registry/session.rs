//! Registry of live connections and the groups they belong to.
//!
//! Each group's membership sits behind its own DashMap shard lock, so joins
//! and leaves in unrelated groups never serialize on one another. The
//! registry references connection handles; the connection task owns them.

use std::sync::Arc;

use dashmap::DashMap;

use invitely_core::error::AppError;
use invitely_core::result::AppResult;
use invitely_core::types::ConnectionId;

use crate::connection::handle::ConnectionHandle;

use super::group::{Group, JoinOutcome, LeaveOutcome};
use super::subscription::SubscriptionTracker;

/// Everything removed when a connection is unregistered.
#[derive(Debug)]
pub struct Departure {
    /// The removed connection.
    pub handle: Arc<ConnectionHandle>,
    /// Groups left, with the membership change for each.
    pub left: Vec<(String, LeaveOutcome)>,
}

/// Registry of live connections.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    groups: DashMap<String, Group>,
    subscriptions: SubscriptionTracker,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a live connection. Group membership is added with [`join`](Self::join).
    pub fn register(&self, handle: Arc<ConnectionHandle>) {
        self.connections.insert(handle.id, handle);
    }

    /// Adds a registered connection to `group`. Idempotent.
    pub fn join(&self, group: &str, conn_id: ConnectionId) -> AppResult<JoinOutcome> {
        let principal = self
            .connections
            .get(&conn_id)
            .map(|handle| handle.principal.id.clone())
            .ok_or_else(|| AppError::not_found(format!("Connection {conn_id} is not registered")))?;

        let outcome = self
            .groups
            .entry(group.to_string())
            .or_insert_with(|| Group::new(group))
            .join(conn_id, &principal);
        if outcome.changed {
            self.subscriptions.add(conn_id, group);
        }
        Ok(outcome)
    }

    /// Removes a connection from `group`. Leaving a group one is not in is a no-op.
    pub fn leave(&self, group: &str, conn_id: ConnectionId) -> LeaveOutcome {
        let outcome = match self.groups.get_mut(group) {
            Some(mut entry) => entry.leave(conn_id),
            None => LeaveOutcome {
                changed: false,
                principal: None,
                last_for_principal: false,
                connection_count: 0,
                principal_count: 0,
            },
        };
        if outcome.changed {
            self.subscriptions.remove(conn_id, group);
            if outcome.connection_count == 0 {
                self.groups.remove_if(group, |_, g| g.is_empty());
            }
        }
        outcome
    }

    /// Removes a connection from every group and from the registry.
    ///
    /// Returns `None` if the connection was already gone, which makes
    /// repeated teardown harmless.
    pub fn unregister(&self, conn_id: ConnectionId) -> Option<Departure> {
        let (_, handle) = self.connections.remove(&conn_id)?;
        let mut groups: Vec<String> = self.subscriptions.remove_all(conn_id).into_iter().collect();
        groups.sort();

        let left = groups
            .into_iter()
            .map(|group| {
                let outcome = match self.groups.get_mut(&group) {
                    Some(mut entry) => entry.leave(conn_id),
                    None => LeaveOutcome {
                        changed: false,
                        principal: None,
                        last_for_principal: false,
                        connection_count: 0,
                        principal_count: 0,
                    },
                };
                if outcome.changed && outcome.connection_count == 0 {
                    self.groups.remove_if(&group, |_, g| g.is_empty());
                }
                (group, outcome)
            })
            .collect();

        Some(Departure { handle, left })
    }

    /// Looks up a connection.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Whether the connection is registered and open.
    pub fn is_alive(&self, conn_id: &ConnectionId) -> bool {
        self.connections
            .get(conn_id)
            .is_some_and(|handle| handle.is_open())
    }

    /// Member connection IDs of `group`.
    pub fn members_of(&self, group: &str) -> Vec<ConnectionId> {
        self.groups
            .get(group)
            .map(|entry| entry.members())
            .unwrap_or_default()
    }

    /// Handles of every member of `group`.
    pub fn handles_of(&self, group: &str) -> Vec<Arc<ConnectionHandle>> {
        self.members_of(group)
            .into_iter()
            .filter_map(|id| self.get(&id))
            .collect()
    }

    /// Number of connections in `group`.
    pub fn member_count(&self, group: &str) -> usize {
        self.groups
            .get(group)
            .map(|entry| entry.connection_count())
            .unwrap_or(0)
    }

    /// Number of distinct principals in `group`.
    pub fn principal_count(&self, group: &str) -> usize {
        self.groups
            .get(group)
            .map(|entry| entry.principal_count())
            .unwrap_or(0)
    }

    /// Groups a connection belongs to.
    pub fn groups_of(&self, conn_id: ConnectionId) -> Vec<String> {
        let mut groups: Vec<String> = self.subscriptions.groups_of(conn_id).into_iter().collect();
        groups.sort();
        groups
    }

    /// Total registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of non-empty groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Names of non-empty groups.
    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Every registered connection.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::authenticator::Principal;
    use invitely_core::types::{PrincipalId, UserRole};
    use tokio::sync::mpsc;

    fn handle(principal: &str, group: &str) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(ConnectionHandle::new(
            Principal {
                id: PrincipalId::from(principal),
                role: UserRole::Staff,
                name: None,
            },
            group,
            tx,
        ))
    }

    fn joined(registry: &SessionRegistry, principal: &str, group: &str) -> Arc<ConnectionHandle> {
        let h = handle(principal, group);
        registry.register(h.clone());
        registry.join(group, h.id).unwrap();
        h
    }

    #[test]
    fn test_join_unknown_connection_fails() {
        let registry = SessionRegistry::new();
        assert!(registry.join("g", ConnectionId::new()).is_err());
    }

    #[test]
    fn test_groups_are_isolated() {
        let registry = SessionRegistry::new();
        let a = joined(&registry, "alice", "admin-dashboard");
        let b = joined(&registry, "bob", "finance");
        assert_eq!(registry.members_of("admin-dashboard"), vec![a.id]);
        assert_eq!(registry.members_of("finance"), vec![b.id]);
        assert!(registry.members_of("nobody").is_empty());
    }

    #[test]
    fn test_unregister_twice_is_harmless() {
        let registry = SessionRegistry::new();
        let a = joined(&registry, "alice", "g");
        let _b = joined(&registry, "bob", "g");

        let first = registry.unregister(a.id).expect("first unregister");
        assert_eq!(first.left.len(), 1);
        assert!(first.left[0].1.last_for_principal);
        assert!(registry.unregister(a.id).is_none());
        assert_eq!(registry.member_count("g"), 1);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_empty_group_is_removed() {
        let registry = SessionRegistry::new();
        let a = joined(&registry, "alice", "g");
        assert_eq!(registry.group_count(), 1);
        registry.leave("g", a.id);
        assert_eq!(registry.group_count(), 0);
        assert!(registry.groups_of(a.id).is_empty());
        // Leaving again is a no-op.
        assert!(!registry.leave("g", a.id).changed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_join_leave_accounting() {
        let registry = Arc::new(SessionRegistry::new());
        let n = 200;
        let m = 120;

        let handles: Vec<_> = (0..n)
            .map(|i| handle(&format!("p{}", i % 17), "g"))
            .collect();
        for h in &handles {
            registry.register(h.clone());
        }

        let mut tasks = Vec::new();
        for h in handles.iter().cloned() {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.join("g", h.id).unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut tasks = Vec::new();
        for h in handles.iter().take(m).cloned() {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.unregister(h.id);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.members_of("g").len(), n - m);
        assert_eq!(registry.member_count("g"), n - m);
        assert_eq!(registry.connection_count(), n - m);
    }
}
