//! Pluggable transport for the client manager.
//!
//! [`WsConnector`] opens a real WebSocket with tokio-tungstenite; tests
//! substitute an in-memory connector to drive the reconnect logic without a
//! network.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use invitely_core::protocol::TOKEN_QUERY_PARAM;

use crate::error::ClientError;

/// A WebSocket frame as the client manager sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// JSON text frame.
    Text(String),
    /// Close frame with its code, if any.
    Close(Option<u16>),
    /// Ping, pong or binary frame.
    Other,
}

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<ClientFrame, Error = ClientError> + Send>>;

/// Inbound half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<ClientFrame, ClientError>> + Send>>;

/// Opens transports to the notification server.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open a transport to `url`, presenting `token` on the handshake.
    async fn connect(&self, url: &str, token: Option<&str>) -> Result<(FrameSink, FrameStream), ClientError>;
}

/// Real WebSocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

/// Append `?token=` to the endpoint URL.
///
/// Access tokens are JWTs, whose base64url segments need no escaping.
pub fn handshake_url(url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}{TOKEN_QUERY_PARAM}={token}")
        }
        None => url.to_string(),
    }
}

fn to_message(frame: ClientFrame) -> Message {
    match frame {
        ClientFrame::Text(text) => Message::text(text),
        ClientFrame::Close(code) => Message::Close(code.map(|code| CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        })),
        ClientFrame::Other => Message::Pong(Default::default()),
    }
}

fn from_message(message: Message) -> ClientFrame {
    match message {
        Message::Text(text) => ClientFrame::Text(text.as_str().to_owned()),
        Message::Close(frame) => ClientFrame::Close(frame.map(|f| u16::from(f.code))),
        _ => ClientFrame::Other,
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str, token: Option<&str>) -> Result<(FrameSink, FrameStream), ClientError> {
        let (socket, _response) = connect_async(handshake_url(url, token))
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let (write, read) = socket.split();

        let sink: FrameSink = Box::pin(
            write
                .sink_map_err(ClientError::from)
                .with(|frame: ClientFrame| futures::future::ready(Ok::<_, ClientError>(to_message(frame)))),
        );
        let stream: FrameStream =
            Box::pin(read.map(|item| item.map(from_message).map_err(ClientError::from)));

        Ok((sink, stream))
    }
}
