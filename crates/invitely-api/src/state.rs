//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use invitely_core::config::AppConfig;
use invitely_realtime::{RealtimeEngine, TokenAuthenticator};

/// Application state passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Real-time engine.
    pub realtime: RealtimeEngine,
    /// Validates bearer tokens on the HTTP endpoints.
    pub authenticator: Arc<dyn TokenAuthenticator>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Creates the state, stamping the start time.
    pub fn new(
        config: Arc<AppConfig>,
        realtime: RealtimeEngine,
        authenticator: Arc<dyn TokenAuthenticator>,
    ) -> Self {
        Self {
            config,
            realtime,
            authenticator,
            started_at: Instant::now(),
        }
    }
}
