//! Gateway error types.

use shardline_events::DecodeError;

use crate::config::ConfigError;

/// Errors from the socket layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not open a connection.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying error.
        reason: String,
    },

    /// Could not write a frame.
    #[error("send failed: {reason}")]
    Send {
        /// Underlying error.
        reason: String,
    },

    /// Could not read a frame.
    #[error("receive failed: {reason}")]
    Receive {
        /// Underlying error.
        reason: String,
    },
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by shard sessions and the shard manager.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Socket failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The remote refused the session; the shard will not reconnect.
    #[error("shard {shard} rejected with close code {code}: {reason}")]
    SessionRejected {
        /// Shard index.
        shard: u32,
        /// Close code.
        code: u16,
        /// Meaning of the code.
        reason: &'static str,
    },

    /// A dispatch could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The shard or manager is not running.
    #[error("gateway closed")]
    Closed,

    /// Shards are already running.
    #[error("shards already started")]
    AlreadyStarted,

    /// No shard with this index is running.
    #[error("unknown shard {shard}")]
    UnknownShard {
        /// Shard index.
        shard: u32,
    },

    /// The shard assignment does not fit the shard count.
    #[error("invalid shard assignment: {reason}")]
    InvalidAssignment {
        /// What is wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
