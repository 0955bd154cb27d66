//! Order and approval domain events.

use serde::{Deserialize, Serialize};

use crate::protocol::ApprovalDecision;

/// Events related to orders and their approval workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderEvent {
    /// An order was created, paid, cancelled or otherwise changed.
    Mutated {
        /// The order ID.
        order_id: String,
        /// What happened to the order.
        action: String,
        /// Status after the change.
        status: String,
        /// Customer display name.
        customer: Option<String>,
        /// Total in minor currency units.
        amount_minor: Option<i64>,
    },
    /// An administrator approved or rejected an order.
    ApprovalDecided {
        /// The order ID.
        order_id: String,
        /// The decision.
        decision: ApprovalDecision,
        /// Who decided.
        decided_by: Option<String>,
        /// Optional reviewer note.
        note: Option<String>,
    },
    /// The number of orders awaiting approval was recomputed.
    PendingCountChanged {
        /// New pending count.
        pending_count: u64,
    },
}
