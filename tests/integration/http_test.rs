//! Integration tests for the HTTP endpoints.

mod helpers;

use reqwest::StatusCode;
use serde_json::{Value, json};

use invitely_core::types::UserRole;

use helpers::TestServer;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await;
    let response = reqwest::get(server.http_url("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["accepting_connections"], true);
}

#[tokio::test]
async fn test_stats_lists_groups_and_counters() {
    let server = TestServer::start().await;
    let _a = server.admin("admin-a", None).await;
    let _b = server.admin("admin-b", Some("finance")).await;
    server.wait_for_connections(2).await;

    let client = reqwest::Client::new();
    let unauthorized = client
        .get(server.http_url("/api/realtime/stats"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let body: Value = client
        .get(server.http_url("/api/realtime/stats"))
        .bearer_auth(server.token("ops", UserRole::Superuser))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["data"]["bus"], "memory");
    assert_eq!(body["data"]["connections"], 2);
    let groups = body["data"]["groups"].as_array().unwrap();
    let names: Vec<&str> = groups.iter().map(|g| g["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["admin-dashboard", "finance"]);
    assert_eq!(body["data"]["metrics"]["connections_total"], 2);
}

#[tokio::test]
async fn test_posted_event_reaches_connected_admins() {
    let server = TestServer::start().await;
    let mut admin = server.admin("admin-a", None).await;
    server.wait_for_connections(1).await;

    let response = reqwest::Client::new()
        .post(server.http_url("/api/realtime/events"))
        .bearer_auth(server.token("backend", UserRole::Staff))
        .json(&json!({
            "domain": "User",
            "event": {
                "type": "Registered",
                "user_id": "u-9",
                "username": "newbie",
                "email": null,
                "registered_at": "2026-01-01T00:00:00Z"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["published"], true);
    assert_eq!(body["data"]["receivers"], 1);

    let message = admin.next_of("new_user").await;
    assert_eq!(message["data"]["username"], "newbie");
}

#[tokio::test]
async fn test_customer_cannot_post_events() {
    let server = TestServer::start().await;
    let response = reqwest::Client::new()
        .post(server.http_url("/api/realtime/events"))
        .bearer_auth(server.token("cust", UserRole::Customer))
        .json(&json!({ "domain": "Order", "event": { "type": "PendingCountChanged", "pending_count": 1 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
