//! Error types for the envelope codec.

use thiserror::Error;

/// Errors that can occur while encoding or decoding an [`Envelope`](crate::Envelope).
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// JSON text could not be decoded into an envelope
    #[error("failed to unmarshal envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// Envelope could not be encoded as JSON
    #[error("failed to marshal envelope: {0}")]
    Encode(#[source] serde_json::Error),
}
