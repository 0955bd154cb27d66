//! Shared test helpers for integration tests.
//!
//! Each test starts the full router on an ephemeral port and talks to it
//! over real sockets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use invitely_api::{AppState, build_router};
use invitely_core::config::{AppConfig, RealtimeConfig};
use invitely_core::types::UserRole;
use invitely_realtime::{
    InMemorySnapshotProvider, JwtAuthenticator, MemoryPubSub, Principal, RealtimeEngine,
};

/// How long a test waits for any single frame.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// A running server on 127.0.0.1.
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// Engine behind the router.
    pub engine: RealtimeEngine,
    /// Token issuer sharing the server's secret.
    pub authenticator: Arc<JwtAuthenticator>,
    /// Dashboard figures served in `connection_established`.
    pub snapshots: Arc<InMemorySnapshotProvider>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Start with default real-time settings.
    pub async fn start() -> Self {
        Self::start_with(RealtimeConfig::default()).await
    }

    /// Start with custom real-time settings.
    pub async fn start_with(realtime: RealtimeConfig) -> Self {
        let mut config = AppConfig::default();
        config.realtime = realtime;
        config.auth.jwt_secret = "integration-test-secret".to_string();

        let authenticator = Arc::new(JwtAuthenticator::new(&config.auth));
        let snapshots = Arc::new(InMemorySnapshotProvider::new());
        let engine = RealtimeEngine::with_tracked_snapshot(
            config.realtime.clone(),
            Arc::new(MemoryPubSub::new(config.realtime.bus_buffer_size)),
            authenticator.clone(),
            snapshots.clone(),
        );

        let state = AppState::new(Arc::new(config), engine.clone(), authenticator.clone());
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server failed");
        });

        Self {
            addr,
            engine,
            authenticator,
            snapshots,
            task,
        }
    }

    /// Sign a token for `id` with `role`.
    pub fn token(&self, id: &str, role: UserRole) -> String {
        let principal = Principal {
            id: id.into(),
            role,
            name: Some(format!("{id} (test)")),
        };
        self.authenticator.issue(&principal, 600).expect("issue token")
    }

    /// WebSocket endpoint URL.
    pub fn ws_url(&self, token: Option<&str>, group: Option<&str>) -> String {
        let mut params = Vec::new();
        if let Some(token) = token {
            params.push(format!("token={token}"));
        }
        if let Some(group) = group {
            params.push(format!("group={group}"));
        }
        if params.is_empty() {
            format!("ws://{}/ws", self.addr)
        } else {
            format!("ws://{}/ws?{}", self.addr, params.join("&"))
        }
    }

    /// HTTP URL for `path`.
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Open a raw WebSocket.
    pub async fn connect(&self, token: Option<&str>, group: Option<&str>) -> WsClient {
        let (stream, _) = connect_async(self.ws_url(token, group))
            .await
            .expect("WebSocket upgrade");
        WsClient { stream }
    }

    /// Connect as a staff member and consume `connection_established`.
    pub async fn admin(&self, id: &str, group: Option<&str>) -> WsClient {
        let token = self.token(id, UserRole::Staff);
        let mut client = self.connect(Some(&token), group).await;
        let greeting = client.next_json().await;
        assert_eq!(greeting["type"], "connection_established");
        client
    }

    /// Wait until the registry holds `count` connections.
    pub async fn wait_for_connections(&self, count: usize) {
        tokio::time::timeout(FRAME_TIMEOUT, async {
            while self.engine.registry.connection_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count not reached");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A raw WebSocket client.
pub struct WsClient {
    /// Underlying stream.
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Next text frame as JSON. Panics on close or timeout.
    pub async fn next_json(&mut self) -> Value {
        loop {
            let message = tokio::time::timeout(FRAME_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .expect("WebSocket error");
            match message {
                Message::Text(text) => return serde_json::from_str(&text).expect("JSON frame"),
                Message::Close(frame) => panic!("unexpected close: {frame:?}"),
                _ => continue,
            }
        }
    }

    /// Skip frames until one of type `kind` arrives.
    pub async fn next_of(&mut self, kind: &str) -> Value {
        loop {
            let value = self.next_json().await;
            if value["type"] == kind {
                return value;
            }
        }
    }

    /// Send a JSON value as a text frame.
    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::text(text.to_string()))
            .await
            .expect("send frame");
    }

    /// Wait for the close frame and return its code. Text frames before it are skipped.
    pub async fn expect_close(&mut self) -> u16 {
        loop {
            let next = tokio::time::timeout(FRAME_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for close");
            match next {
                Some(Ok(Message::Close(Some(frame)))) => return u16::from(frame.code),
                Some(Ok(Message::Close(None))) => panic!("close frame without a code"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("WebSocket error before close: {e}"),
                None => panic!("stream ended without a close frame"),
            }
        }
    }

    /// Assert that no message of type `kind` arrives within `window`.
    pub async fn assert_no(&mut self, kind: &str, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) => return,
                Ok(Some(Ok(Message::Text(text)))) => {
                    let value: Value = serde_json::from_str(&text).expect("JSON frame");
                    assert_ne!(value["type"], kind, "unexpected {kind}: {value}");
                }
                Ok(Some(Ok(_))) => continue,
                Ok(other) => panic!("connection ended: {other:?}"),
            }
        }
    }
}
