//! End-to-end tests for the reconnecting client against a live server.

mod helpers;

use std::time::Duration;

use tokio::sync::watch;

use invitely_client::{ClientConfig, ClientConnectionManager, ClientState};
use invitely_core::protocol::{MessageType, PendingCountPayload};
use invitely_core::types::UserRole;

use helpers::{FRAME_TIMEOUT, TestServer};

fn fast_config() -> ClientConfig {
    ClientConfig {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        jitter: 0.0,
        max_attempts: Some(3),
        ..ClientConfig::default()
    }
}

async fn wait_for(states: &mut watch::Receiver<ClientState>, target: ClientState) {
    tokio::time::timeout(FRAME_TIMEOUT, states.wait_for(|s| *s == target))
        .await
        .expect("state not reached")
        .expect("manager dropped");
}

#[tokio::test]
async fn test_client_receives_broadcasts() {
    let server = TestServer::start().await;
    let manager = ClientConnectionManager::websocket(server.ws_url(None, None), fast_config());
    manager.set_token(server.token("admin-1", UserRole::Staff));

    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    manager.on(MessageType::PendingCountUpdate, move |p: PendingCountPayload| {
        let _ = seen_tx.send(p.pending_count);
    });

    let mut states = manager.watch_state();
    manager.connect().unwrap();
    wait_for(&mut states, ClientState::Open).await;
    server.wait_for_connections(1).await;

    server.engine.dispatcher.on_pending_count_changed(11).await;
    let count = tokio::time::timeout(FRAME_TIMEOUT, seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count, 11);

    manager.disconnect();
    assert_eq!(manager.state(), ClientState::Idle);
    server.wait_for_connections(0).await;
}

#[tokio::test]
async fn test_client_with_bad_token_gives_up() {
    let server = TestServer::start().await;
    let manager = ClientConnectionManager::websocket(server.ws_url(None, None), fast_config());
    manager.set_token("garbage");

    let mut states = manager.watch_state();
    manager.connect().unwrap();
    wait_for(&mut states, ClientState::Failed).await;
    assert_eq!(server.engine.registry.connection_count(), 0);
    assert_eq!(server.engine.metrics.snapshot().handshakes_rejected, 4);
}

#[tokio::test]
async fn test_client_reconnects_after_server_drops_it() {
    let server = TestServer::start().await;
    let manager = ClientConnectionManager::websocket(server.ws_url(None, None), fast_config());
    manager.set_token(server.token("admin-1", UserRole::Staff));

    let mut states = manager.watch_state();
    manager.connect().unwrap();
    wait_for(&mut states, ClientState::Open).await;
    server.wait_for_connections(1).await;

    // Force the server side closed without shutting the engine down.
    for handle in server.engine.registry.all_connections() {
        handle.request_close(invitely_realtime::TeardownReason::SlowConsumer);
    }
    wait_for(&mut states, ClientState::Reconnecting).await;
    wait_for(&mut states, ClientState::Open).await;
    server.wait_for_connections(1).await;
}
