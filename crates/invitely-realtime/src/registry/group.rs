//! Membership of a single broadcast group.

use std::collections::HashMap;

use invitely_core::types::{ConnectionId, PrincipalId};

/// Result of adding a connection to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// `false` when the connection was already a member.
    pub changed: bool,
    /// The principal had no other connection in the group.
    pub first_for_principal: bool,
    /// Connections in the group after the join.
    pub connection_count: usize,
    /// Distinct principals in the group after the join.
    pub principal_count: usize,
}

/// Result of removing a connection from a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// `false` when the connection was not a member.
    pub changed: bool,
    /// Principal that owned the removed connection.
    pub principal: Option<PrincipalId>,
    /// The principal has no connection left in the group.
    pub last_for_principal: bool,
    /// Connections remaining in the group.
    pub connection_count: usize,
    /// Distinct principals remaining in the group.
    pub principal_count: usize,
}

/// A broadcast group with its member connections.
#[derive(Debug, Clone, Default)]
pub struct Group {
    /// Group name.
    pub name: String,
    members: HashMap<ConnectionId, PrincipalId>,
    principals: HashMap<PrincipalId, usize>,
}

impl Group {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a member. Idempotent.
    pub fn join(&mut self, conn_id: ConnectionId, principal: &PrincipalId) -> JoinOutcome {
        let changed = !self.members.contains_key(&conn_id);
        let mut first_for_principal = false;
        if changed {
            self.members.insert(conn_id, principal.clone());
            let count = self.principals.entry(principal.clone()).or_insert(0);
            first_for_principal = *count == 0;
            *count += 1;
        }
        JoinOutcome {
            changed,
            first_for_principal,
            connection_count: self.members.len(),
            principal_count: self.principals.len(),
        }
    }

    /// Removes a member. Removing a non-member is a no-op.
    pub fn leave(&mut self, conn_id: ConnectionId) -> LeaveOutcome {
        let Some(principal) = self.members.remove(&conn_id) else {
            return LeaveOutcome {
                changed: false,
                principal: None,
                last_for_principal: false,
                connection_count: self.members.len(),
                principal_count: self.principals.len(),
            };
        };

        let mut last_for_principal = false;
        if let Some(count) = self.principals.get_mut(&principal) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.principals.remove(&principal);
                last_for_principal = true;
            }
        }

        LeaveOutcome {
            changed: true,
            principal: Some(principal),
            last_for_principal,
            connection_count: self.members.len(),
            principal_count: self.principals.len(),
        }
    }

    /// Whether the connection is a member.
    pub fn contains(&self, conn_id: &ConnectionId) -> bool {
        self.members.contains_key(conn_id)
    }

    /// Member connection IDs.
    pub fn members(&self) -> Vec<ConnectionId> {
        self.members.keys().copied().collect()
    }

    /// Number of member connections.
    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    /// Number of distinct principals.
    pub fn principal_count(&self) -> usize {
        self.principals.len()
    }

    /// Returns whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
