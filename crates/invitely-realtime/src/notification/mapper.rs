//! Pure mapping from domain events to notification payloads.

use serde_json::Value;

use invitely_core::events::{EventPayload, OrderEvent, UserEvent};
use invitely_core::protocol::{
    ApprovalUpdatePayload, MessageType, NewUserPayload, OrderUpdatePayload, PendingCountPayload,
};
use invitely_core::result::AppResult;

/// Message type and payload for a domain event.
///
/// | event                       | message                |
/// |-----------------------------|------------------------|
/// | user registered             | `new_user`             |
/// | approval decided            | `approval_update`      |
/// | pending count changed       | `pending_count_update` |
/// | order mutated               | `order_update`         |
pub fn map_event(event: &EventPayload) -> AppResult<(MessageType, Value)> {
    let mapped = match event {
        EventPayload::User(UserEvent::Registered {
            user_id,
            username,
            email,
            registered_at,
        }) => (
            MessageType::NewUser,
            serde_json::to_value(NewUserPayload {
                user_id: user_id.clone(),
                username: username.clone(),
                email: email.clone(),
                registered_at: registered_at.timestamp_millis(),
            })?,
        ),
        EventPayload::Order(OrderEvent::ApprovalDecided {
            order_id,
            decision,
            decided_by,
            note,
        }) => (
            MessageType::ApprovalUpdate,
            serde_json::to_value(ApprovalUpdatePayload {
                order_id: order_id.clone(),
                decision: *decision,
                decided_by: decided_by.clone(),
                note: note.clone(),
                pending_count: None,
            })?,
        ),
        EventPayload::Order(OrderEvent::PendingCountChanged { pending_count }) => (
            MessageType::PendingCountUpdate,
            serde_json::to_value(PendingCountPayload {
                pending_count: *pending_count,
            })?,
        ),
        EventPayload::Order(OrderEvent::Mutated {
            order_id,
            action,
            status,
            customer,
            amount_minor,
        }) => (
            MessageType::OrderUpdate,
            serde_json::to_value(OrderUpdatePayload {
                order_id: order_id.clone(),
                action: action.clone(),
                status: status.clone(),
                customer: customer.clone(),
                amount_minor: *amount_minor,
            })?,
        ),
    };
    Ok(mapped)
}
