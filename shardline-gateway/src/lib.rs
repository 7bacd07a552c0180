//! Shardline Gateway - persistent shard connections to the event gateway.
//!
//! This crate owns the long-lived side of the client:
//!
//! - **Shard sessions**: one task per shard running the connect, hello,
//!   identify or resume, heartbeat and reconnect cycle.
//! - **Shard manager**: starts and stops sessions, gates identifies through
//!   the remote's concurrency limit, and routes entities to shards.
//! - **Protocol**: the JSON `{op, d, s, t}` frames and close codes.
//! - **Transport**: the [`GatewayTransport`] seam and a WebSocket
//!   implementation.
//!
//! # Event pipeline
//!
//! For every dispatch a session updates its sequence, decodes the frame,
//! applies the resulting cache patch and publishes the event, all on its own
//! task. Events of one shard are therefore observed in arrival order.
//!
//! # Session states
//!
//! ```text
//! Idle ─▶ Connecting ─▶ AwaitingHello ─▶ Identifying ─┐
//!            ▲                     └──▶ Resuming ────┤
//!            │                                        ▼
//!            └──────────── Reconnecting ◀──────── Connected
//!
//! any ─▶ Closed   (stop, or the remote rejects the session)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod identify;
pub mod limiter;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod websocket;

pub use config::{ConfigError, GatewayConfig};
pub use error::{GatewayError, GatewayResult, TransportError, TransportResult};
pub use identify::IdentifyQueue;
pub use limiter::CommandLimiter;
pub use manager::{shard_for, ShardAssignment, ShardManager};
pub use protocol::{intents, CloseAction, GatewayCommand, GatewayFrame, OpCode};
pub use session::{ShardHandle, ShardInfo, ShardState};
pub use transport::{GatewayConnection, GatewayTransport, Inbound};
pub use websocket::WebSocketTransport;
