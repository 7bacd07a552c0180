//! Client error types.

use shardline_cache::CacheError;
use shardline_events::{DecodeError, WaitError};
use shardline_flow::{DispatchError, TransportFailure};
use shardline_gateway::GatewayError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configuration file could not be read.
    #[error("failed to read config from {path}: {source}")]
    ConfigIo {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration could not be parsed or is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// What is wrong.
        message: String,
    },

    /// Gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// REST dispatch failure.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The HTTP client could not be built.
    #[error("http transport: {0}")]
    Transport(#[from] TransportFailure),

    /// A response payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A cache write was rejected.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A request or response body was not valid JSON.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// A wait for an event timed out.
    #[error(transparent)]
    Wait(#[from] WaitError),
}

impl ClientError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<shardline_gateway::ConfigError> for ClientError {
    fn from(e: shardline_gateway::ConfigError) -> Self {
        Self::config(format!("gateway: {e}"))
    }
}

impl From<shardline_flow::ConfigError> for ClientError {
    fn from(e: shardline_flow::ConfigError) -> Self {
        Self::config(format!("http: {e}"))
    }
}
