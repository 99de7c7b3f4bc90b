//! Error types for key parsing.

use thiserror::Error;

/// Errors that can occur when parsing keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key string is empty.
    #[error("{kind} key cannot be empty")]
    Empty { kind: &'static str },

    /// The key is not a valid decimal number of the right width.
    #[error("invalid {kind} key '{input}': {reason}")]
    Invalid {
        kind: &'static str,
        input: String,
        reason: String,
    },
}

impl KeyError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, KeyError::Empty { .. })
    }
}
