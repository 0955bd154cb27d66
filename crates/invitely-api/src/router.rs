//! Route definitions for the notification HTTP surface.
//!
//! The WebSocket endpoint lives at `/ws`; everything else is mounted under
//! `/api`.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/realtime/stats", get(handlers::stats::realtime_stats))
        .route("/realtime/events", post(handlers::events::dispatch_event));

    let cors = build_cors_layer(&state.config.server.cors);

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(handlers::ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use invitely_core::config::AppConfig;
    use invitely_core::types::UserRole;
    use invitely_realtime::{
        InMemorySnapshotProvider, JwtAuthenticator, MemoryPubSub, Principal, RealtimeEngine,
    };

    use super::*;

    fn state() -> (AppState, Arc<JwtAuthenticator>) {
        let config = AppConfig::default();
        let authenticator = Arc::new(JwtAuthenticator::new(&config.auth));
        let engine = RealtimeEngine::with_tracked_snapshot(
            config.realtime.clone(),
            Arc::new(MemoryPubSub::new(16)),
            authenticator.clone(),
            Arc::new(InMemorySnapshotProvider::new()),
        );
        (
            AppState::new(Arc::new(config), engine, authenticator.clone()),
            authenticator,
        )
    }

    fn token(auth: &JwtAuthenticator, role: UserRole) -> String {
        let principal = Principal {
            id: "u-1".into(),
            role,
            name: None,
        };
        auth.issue(&principal, 600).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (state, _) = state();
        let response = build_router(state)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_requires_admin() {
        let (state, auth) = state();
        let app = build_router(state);

        let anonymous = app
            .clone()
            .oneshot(Request::get("/api/realtime/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let customer = app
            .clone()
            .oneshot(
                Request::get("/api/realtime/stats")
                    .header("authorization", format!("Bearer {}", token(&auth, UserRole::Customer)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(customer.status(), StatusCode::FORBIDDEN);

        let admin = app
            .oneshot(
                Request::get("/api/realtime/stats")
                    .header("authorization", format!("Bearer {}", token(&auth, UserRole::Staff)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(admin.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_event_with_no_subscribers() {
        let (state, auth) = state();
        let response = build_router(state)
            .oneshot(
                Request::post("/api/realtime/events")
                    .header("authorization", format!("Bearer {}", token(&auth, UserRole::Staff)))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"domain":"Order","event":{"type":"PendingCountChanged","pending_count":2}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
