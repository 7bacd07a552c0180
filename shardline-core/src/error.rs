//! Error types for core identifier handling.

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the identifier codec.
///
/// These are always caller bugs and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The text is not a valid unsigned 64-bit decimal.
    #[error("malformed identifier '{input}': {reason}")]
    MalformedIdentifier {
        /// The rejected input (truncated to 32 characters).
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl CoreError {
    pub(crate) fn malformed(input: &str, reason: &'static str) -> Self {
        Self::MalformedIdentifier {
            input: input.chars().take(32).collect(),
            reason,
        }
    }
}
