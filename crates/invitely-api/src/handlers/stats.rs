//! Real-time engine statistics.

use axum::Json;
use axum::extract::State;

use invitely_realtime::EngineStats;

use crate::dto::ApiResponse;
use crate::extractors::AdminUser;
use crate::state::AppState;

/// GET /api/realtime/stats
pub async fn realtime_stats(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Json<ApiResponse<EngineStats>> {
    tracing::debug!(principal_id = %admin.id, "Serving real-time stats");
    Json(ApiResponse::ok(state.realtime.stats()))
}
