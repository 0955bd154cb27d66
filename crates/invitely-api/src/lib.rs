//! # invitely-api
//!
//! HTTP layer for the Invitely admin notification service, built on Axum.
//!
//! Serves the WebSocket endpoint that administrators' dashboards connect to,
//! plus health and engine statistics endpoints and an authenticated
//! endpoint through which out-of-process business logic can dispatch
//! domain events.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
