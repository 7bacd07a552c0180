//! Gateway transport abstraction.
//!
//! Sessions talk to the gateway through these traits, so tests can replace
//! the WebSocket with an in-memory script.
//!
//! Production code uses [`WebSocketTransport`](crate::WebSocketTransport).

use async_trait::async_trait;

use crate::error::TransportResult;

/// A message received from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame.
    Text(String),
    /// The remote closed the connection.
    Close {
        /// Close code, if one was sent.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// An open gateway connection.
#[async_trait]
pub trait GatewayConnection: Send + 'static {
    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be written.
    async fn send(&mut self, text: String) -> TransportResult<()>;

    /// Receives the next message.
    ///
    /// Returns `None` when the stream ends without a close frame. Must be
    /// cancel safe: dropping the future loses no message.
    async fn recv(&mut self) -> Option<TransportResult<Inbound>>;

    /// Closes the connection with `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame could not be written.
    async fn close(&mut self, code: u16) -> TransportResult<()>;
}

/// Opens gateway connections.
#[async_trait]
pub trait GatewayTransport: Send + Sync + 'static {
    /// Connects to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection could not be established.
    async fn connect(&self, url: &str) -> TransportResult<Box<dyn GatewayConnection>>;
}
