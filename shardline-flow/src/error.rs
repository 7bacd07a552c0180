//! Dispatcher error types.

use std::time::Duration;

use http::StatusCode;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced to callers of the dispatcher.
///
/// Throttling and transient failures are handled inside the dispatcher and
/// only reach the caller once the attempt ceiling is exhausted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// The remote kept throttling until the attempt ceiling was reached.
    #[error("throttled on {route}, last retry-after {retry_after:?}")]
    Throttled {
        /// The route group.
        route: String,
        /// Last retry-after reported by the remote.
        retry_after: Duration,
    },

    /// Transient failures exhausted the retry budget.
    #[error("request on {route} failed after {attempts} attempts: {reason}")]
    RequestFailed {
        /// The route group.
        route: String,
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },

    /// The remote rejected the request with a non-retryable status.
    #[error("request on {route} rejected with status {status}")]
    Http {
        /// The route group.
        route: String,
        /// Response status.
        status: StatusCode,
        /// Response body, usually a JSON error object.
        body: bytes::Bytes,
    },

    /// The dispatcher was shut down before the request completed.
    #[error("dispatcher closed")]
    DispatcherClosed,

    /// The caller's deadline elapsed while waiting.
    #[error("timed out after {waited:?}")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },
}

/// A transport-level failure: the request never produced a response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport failure: {message}")]
pub struct TransportFailure {
    /// Description of the failure.
    pub message: String,
}

impl TransportFailure {
    /// Creates a transport failure from any displayable error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
