//! WebSocket gateway transport.

use std::borrow::Cow;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::transport::{GatewayConnection, GatewayTransport, Inbound};

/// Gateway API version requested on connect.
pub const API_VERSION: u8 = 10;

/// Connects to the gateway over WebSocket with JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Adds version and encoding parameters unless the URL has a query already.
fn connect_url(url: &str) -> String {
    if url.contains('?') {
        url.to_string()
    } else {
        format!("{}/?v={API_VERSION}&encoding=json", url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GatewayTransport for WebSocketTransport {
    async fn connect(&self, url: &str) -> TransportResult<Box<dyn GatewayConnection>> {
        let url = connect_url(url);
        debug!(url = %url, "Opening gateway connection");
        let (stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewayConnection for WebSocketConnection {
    async fn send(&mut self, text: String) -> TransportResult<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send {
                reason: e.to_string(),
            })
    }

    async fn recv(&mut self) -> Option<TransportResult<Inbound>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(TransportError::Receive {
                        reason: e.to_string(),
                    }))
                }
            };
            match message {
                Message::Text(text) => return Some(Ok(Inbound::Text(text))),
                Message::Binary(bytes) => {
                    return Some(String::from_utf8(bytes).map(Inbound::Text).map_err(|e| {
                        TransportError::Receive {
                            reason: e.to_string(),
                        }
                    }));
                }
                Message::Close(frame) => {
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.into_owned())
                    });
                    return Some(Ok(Inbound::Close { code, reason }));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self, code: u16) -> TransportResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Borrowed(""),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| TransportError::Send {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url() {
        assert_eq!(
            connect_url("wss://gateway.example"),
            "wss://gateway.example/?v=10&encoding=json"
        );
        assert_eq!(
            connect_url("wss://gateway.example/"),
            "wss://gateway.example/?v=10&encoding=json"
        );
        assert_eq!(connect_url("wss://g.example/?v=9"), "wss://g.example/?v=9");
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let err = WebSocketTransport::new()
            .connect("ws://127.0.0.1:1")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
