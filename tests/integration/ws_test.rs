//! Integration tests for the WebSocket notification endpoint.

mod helpers;

use std::time::Duration;

use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use invitely_core::config::RealtimeConfig;
use invitely_core::types::UserRole;

use helpers::{TestServer, WsClient};

#[tokio::test]
async fn test_missing_token_closes_with_4001() {
    let server = TestServer::start().await;
    let mut client = server.connect(None, None).await;
    assert_eq!(client.expect_close().await, 4001);
}

#[tokio::test]
async fn test_garbage_token_closes_with_4001() {
    let server = TestServer::start().await;
    let mut client = server.connect(Some("not-a-jwt"), None).await;
    assert_eq!(client.expect_close().await, 4001);
}

#[tokio::test]
async fn test_customer_closes_with_4003() {
    let server = TestServer::start().await;
    let token = server.token("cust-1", UserRole::Customer);
    let mut client = server.connect(Some(&token), None).await;
    assert_eq!(client.expect_close().await, 4003);
    assert_eq!(server.engine.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_connection_established_carries_snapshot() {
    let server = TestServer::start().await;
    server.snapshots.set_pending_count(7).await;

    let token = server.token("admin-1", UserRole::Superuser);
    let mut client = server.connect(Some(&token), None).await;
    let greeting = client.next_json().await;

    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["data"]["group"], "admin-dashboard");
    assert_eq!(greeting["data"]["principal_id"], "admin-1");
    assert_eq!(greeting["data"]["snapshot"]["pending_count"], 7);
    assert!(greeting["data"]["connection_id"].is_string());
    assert!(greeting["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_bearer_header_fallback() {
    let server = TestServer::start().await;
    let token = server.token("admin-1", UserRole::Staff);

    let mut request = server.ws_url(None, None).into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    let (stream, _) = connect_async(request).await.unwrap();
    let mut client = WsClient { stream };

    assert_eq!(client.next_json().await["type"], "connection_established");
}

#[tokio::test]
async fn test_ping_pong_and_direct_replies() {
    let server = TestServer::start().await;
    let mut client = server.admin("admin-1", None).await;

    client.send_json(json!({ "type": "ping", "timestamp": 1234 })).await;
    let pong = client.next_of("pong").await;
    assert_eq!(pong["data"]["client_timestamp"], 1234);

    client.send_json(json!({ "type": "get_pending_count" })).await;
    let count = client.next_of("pending_count_update").await;
    assert_eq!(count["data"]["pending_count"], 0);

    client.send_json(json!({ "type": "get_stats" })).await;
    let stats = client.next_of("stats").await;
    assert!(stats["data"].is_object());
}

#[tokio::test]
async fn test_two_admins_and_isolated_group() {
    let server = TestServer::start().await;
    let mut first = server.admin("admin-a", None).await;
    let mut second = server.admin("admin-b", None).await;
    let mut finance = server.admin("admin-c", Some("finance")).await;
    server.wait_for_connections(3).await;

    // The first admin also sees its own arrival announced.
    let own = first.next_of("admin_joined").await;
    assert_eq!(own["data"]["principal_id"], "admin-a");
    let joined = first.next_of("admin_joined").await;
    assert_eq!(joined["data"]["principal_id"], "admin-b");
    assert_eq!(joined["data"]["admin_count"], 2);

    server.engine.dispatcher.on_pending_count_changed(5).await;

    for client in [&mut first, &mut second] {
        let update = client.next_of("pending_count_update").await;
        assert_eq!(update["data"]["pending_count"], 5);
    }
    finance
        .assert_no("pending_count_update", Duration::from_millis(300))
        .await;
}

#[tokio::test]
async fn test_admin_left_announced_to_remaining_members() {
    let server = TestServer::start().await;
    let mut first = server.admin("admin-a", None).await;
    let second = server.admin("admin-b", None).await;
    server.wait_for_connections(2).await;

    drop(second);
    let left = first.next_of("admin_left").await;
    assert_eq!(left["data"]["principal_id"], "admin-b");
    assert_eq!(left["data"]["admin_count"], 1);
    server.wait_for_connections(1).await;
}

#[tokio::test]
async fn test_flood_guard_closes_with_4009() {
    let config = RealtimeConfig {
        max_consecutive_parse_failures: 3,
        ..RealtimeConfig::default()
    };
    let server = TestServer::start_with(config).await;
    let mut client = server.admin("admin-1", None).await;

    for _ in 0..3 {
        client.send_text("{not json").await;
    }
    assert_eq!(client.expect_close().await, 4009);
    server.wait_for_connections(0).await;
}

#[tokio::test]
async fn test_shutdown_closes_with_1001_and_rejects_new_connections() {
    let server = TestServer::start().await;
    let mut client = server.admin("admin-1", None).await;
    server.wait_for_connections(1).await;

    server
        .engine
        .shutdown(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(client.expect_close().await, 1001);

    let token = server.token("admin-2", UserRole::Staff);
    let mut late = server.connect(Some(&token), None).await;
    assert_eq!(late.expect_close().await, 1001);
}
