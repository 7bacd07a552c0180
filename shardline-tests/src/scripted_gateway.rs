//! Scripted gateway transport.
//!
//! Each expected connection is prepared with
//! [`ScriptedGateway::expect_connection`], which returns the remote end. The
//! test pushes frames through the remote end and reads what the client sent.
//! Connecting when no connection is prepared fails like an unreachable host.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shardline_gateway::protocol::CLOSE_RESUMABLE;
use shardline_gateway::{
    GatewayConnection, GatewayFrame, GatewayTransport, Inbound, OpCode, TransportError,
    TransportResult,
};
use tokio::sync::mpsc;

/// Something the client wrote to a scripted connection.
#[derive(Debug, Clone)]
pub enum Sent {
    /// A frame.
    Frame(GatewayFrame),
    /// A close frame with its code.
    Close(u16),
}

struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: mpsc::UnboundedSender<Sent>,
}

#[async_trait]
impl GatewayConnection for ScriptedConnection {
    async fn send(&mut self, text: String) -> TransportResult<()> {
        let frame = GatewayFrame::parse(&text).map_err(|e| TransportError::Send {
            reason: e.to_string(),
        })?;
        self.sent
            .send(Sent::Frame(frame))
            .map_err(|_| TransportError::Send {
                reason: "remote end dropped".to_string(),
            })
    }

    async fn recv(&mut self) -> Option<TransportResult<Inbound>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16) -> TransportResult<()> {
        let _ = self.sent.send(Sent::Close(code));
        Ok(())
    }
}

/// The remote side of one scripted connection.
#[derive(Debug)]
pub struct RemoteEnd {
    to_client: mpsc::UnboundedSender<Inbound>,
    sent: mpsc::UnboundedReceiver<Sent>,
}

impl RemoteEnd {
    /// Sends a frame to the client.
    pub fn push(&self, frame: &GatewayFrame) {
        if let Ok(text) = frame.to_text() {
            let _ = self.to_client.send(Inbound::Text(text));
        }
    }

    /// Sends Hello with `interval`.
    pub fn hello(&self, interval: Duration) {
        self.push(&GatewayFrame::hello(interval));
    }

    /// Sends a dispatch.
    pub fn dispatch(&self, seq: u64, name: &str, data: Value) {
        self.push(&GatewayFrame::dispatch(seq, name, data));
    }

    /// Sends Invalid Session.
    pub fn invalid_session(&self, resumable: bool) {
        self.push(&GatewayFrame::invalid_session(resumable));
    }

    /// Sends an opcode with no payload.
    pub fn op(&self, op: OpCode) {
        self.push(&GatewayFrame::new(op, Value::Null));
    }

    /// Closes the connection from the remote side.
    pub fn close(&self, code: u16) {
        let _ = self.to_client.send(Inbound::Close {
            code: Some(code),
            reason: String::new(),
        });
    }

    /// Closes with a resumable code.
    pub fn close_resumable(&self) {
        self.close(CLOSE_RESUMABLE);
    }

    /// Next thing the client wrote, or `None` once the client dropped the
    /// connection.
    pub async fn next(&mut self) -> Option<Sent> {
        self.sent.recv().await
    }

    /// Next frame the client sent, skipping close frames.
    pub async fn next_frame(&mut self) -> Option<GatewayFrame> {
        loop {
            match self.sent.recv().await? {
                Sent::Frame(frame) => return Some(frame),
                Sent::Close(_) => {}
            }
        }
    }

    /// Next frame with opcode `op`, skipping anything else.
    pub async fn next_op(&mut self, op: OpCode) -> Option<GatewayFrame> {
        loop {
            let frame = self.next_frame().await?;
            if frame.opcode() == Some(op) {
                return Some(frame);
            }
        }
    }

    /// Next close code the client sent, skipping frames.
    pub async fn next_close(&mut self) -> Option<u16> {
        loop {
            match self.sent.recv().await? {
                Sent::Close(code) => return Some(code),
                Sent::Frame(_) => {}
            }
        }
    }
}

/// A gateway transport serving prepared connections in order.
#[derive(Default)]
pub struct ScriptedGateway {
    connections: Mutex<VecDeque<ScriptedConnection>>,
    urls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    /// Creates a gateway with no prepared connections.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Prepares the next connection and returns its remote end.
    pub fn expect_connection(&self) -> RemoteEnd {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (sent_tx, sent) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ScriptedConnection {
                inbound,
                sent: sent_tx,
            });
        RemoteEnd { to_client, sent }
    }

    /// URLs of every connection attempt so far.
    #[must_use]
    pub fn connected_urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Prepared connections not yet used.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl GatewayTransport for ScriptedGateway {
    async fn connect(&self, url: &str) -> TransportResult<Box<dyn GatewayConnection>> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        let next = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(TransportError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}
