//! Invitely notification server.
//!
//! Wires configuration, logging, the pub/sub backbone and the real-time
//! engine together and serves the WebSocket and HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use invitely_core::config::AppConfig;
use invitely_core::error::AppError;
use invitely_realtime::{InMemorySnapshotProvider, JwtAuthenticator, RealtimeEngine, build_event_bus};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load `config/default.toml`, the `INVITELY_ENV` overlay and `INVITELY__*` variables.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("INVITELY_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing. `RUST_LOG` overrides the configured level.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Invitely notification server v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Pub/sub backbone ─────────────────────────────────
    let bus = build_event_bus(&config.bus, config.realtime.bus_buffer_size).await?;
    tracing::info!(bus = bus.name(), "Event bus ready");

    // ── Step 2: Real-time engine ─────────────────────────────────
    let authenticator = Arc::new(JwtAuthenticator::new(&config.auth));
    let snapshots = Arc::new(InMemorySnapshotProvider::new());
    let engine = RealtimeEngine::with_tracked_snapshot(
        config.realtime.clone(),
        bus,
        authenticator.clone(),
        snapshots,
    );

    // ── Step 3: HTTP server ──────────────────────────────────────
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let addr = config.server.bind_address();
    let state = invitely_api::AppState::new(Arc::new(config), engine.clone(), authenticator);
    let app = invitely_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("Invitely notification server listening on {}", addr);

    // ── Step 4: Graceful shutdown ────────────────────────────────
    // WebSocket connections are closed with ServerShutdown before axum
    // stops waiting on them.
    let shutdown_engine = engine.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, closing connections");
            if let Err(e) = shutdown_engine.shutdown(grace).await {
                tracing::error!(error = %e, "Real-time engine shutdown failed");
            }
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    tracing::info!("Invitely notification server shut down gracefully");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
