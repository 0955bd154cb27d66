//! WebSocket upgrade handler.
//!
//! The upgrade is always accepted; credentials are checked by the
//! connection manager afterwards so that a rejected client receives a close
//! frame with the reason code instead of a bare HTTP error.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt, future};
use serde::Deserialize;

use invitely_core::protocol::CloseReason;
use invitely_realtime::{ConnectionManager, Frame, HandshakeRequest};

use crate::extractors::bearer_token;
use crate::state::AppState;

/// Handshake query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Access token. Falls back to the `Authorization` header when absent.
    pub token: Option<String>,
    /// Group to join. The configured default when absent.
    pub group: Option<String>,
}

/// GET /ws?token={jwt}&group={group}
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let request = HandshakeRequest {
        token: query
            .token
            .filter(|t| !t.is_empty())
            .or_else(|| bearer_token(&headers)),
        group: query.group.filter(|g| !g.is_empty()),
    };

    let connections = Arc::clone(&state.realtime.connections);
    ws.on_upgrade(move |socket| serve_socket(connections, socket, request))
}

/// Adapts the axum socket to [`Frame`]s and hands it to the connection manager.
async fn serve_socket(
    connections: Arc<ConnectionManager>,
    socket: WebSocket,
    request: HandshakeRequest,
) {
    let (ws_tx, ws_rx) = socket.split();
    let sink = Box::pin(ws_tx.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame)))));
    let stream = Box::pin(ws_rx.map(|item| item.map(from_message)));

    connections.serve(sink, stream, request).await;
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Close(reason) => Message::Close(reason.map(|reason| CloseFrame {
            code: reason.code(),
            reason: reason.as_str().into(),
        })),
        Frame::Control => Message::Pong(Default::default()),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Close(frame) => Frame::Close(frame.and_then(|f| CloseReason::from_code(f.code))),
        _ => Frame::Control,
    }
}
