//! Error types for payload encoding.

use thiserror::Error;

/// Errors that can occur when encoding or decoding status payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("failed to encode {codec} payload: {reason}")]
    Encode { codec: &'static str, reason: String },

    /// The payload could not be decoded.
    #[error("failed to decode {codec} payload: {reason}")]
    Decode { codec: &'static str, reason: String },

    /// The codec name is not recognised.
    #[error("unknown codec: {0}")]
    UnknownCodec(String),
}
