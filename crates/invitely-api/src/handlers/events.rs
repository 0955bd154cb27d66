//! Domain event intake for business logic running outside this process.

use axum::Json;
use axum::extract::State;

use invitely_core::error::AppError;
use invitely_core::events::{DomainEvent, EventPayload};
use invitely_realtime::PublishOutcome;

use crate::dto::{ApiResponse, DispatchResponse};
use crate::error::ApiError;
use crate::extractors::AdminUser;
use crate::state::AppState;

/// POST /api/realtime/events
///
/// Body is an [`EventPayload`], e.g.
/// `{"domain":"Order","event":{"type":"PendingCountChanged","pending_count":3}}`.
pub async fn dispatch_event(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(payload): Json<EventPayload>,
) -> Result<Json<ApiResponse<DispatchResponse>>, ApiError> {
    if !state.realtime.connections.is_accepting() {
        return Err(AppError::service_unavailable("Server is shutting down").into());
    }

    let event = DomainEvent::new(payload);
    tracing::info!(event_id = %event.id, principal_id = %admin.id, "Dispatching domain event");

    let dispatcher = &state.realtime.dispatcher;
    let (published, receivers) = match dispatcher.dispatch(&event).await {
        PublishOutcome::Published { receivers } => (true, receivers),
        PublishOutcome::Dropped => (false, 0),
    };

    Ok(Json(ApiResponse::ok(DispatchResponse {
        group: dispatcher.default_group().to_string(),
        published,
        receivers,
    })))
}
