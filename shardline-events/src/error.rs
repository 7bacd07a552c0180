//! Event error types.

use std::fmt;
use std::time::Duration;

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A dispatch payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload did not have the expected shape.
    #[error("malformed {event} payload: {reason}")]
    Malformed {
        /// Dispatch name.
        event: String,
        /// What was wrong.
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(event: &str, reason: impl fmt::Display) -> Self {
        Self::Malformed {
            event: event.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A listener failed to handle an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("listener failed: {message}")]
pub struct ListenerError {
    /// Description of the failure.
    pub message: String,
}

impl ListenerError {
    /// Creates a listener error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A one-shot wait ended without a matching event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The deadline elapsed.
    #[error("no matching event within {waited:?}")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },
}
