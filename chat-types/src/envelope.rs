//! Envelope - the wire format unit relayed between participants.

use serde::{Deserialize, Serialize};

use crate::EnvelopeError;

/// The envelope carries one end-to-end encrypted message.
///
/// This is everything the relay sees. `content`, `nonce` and `signature`
/// are opaque to the relay and pass through byte-for-byte. Field names on
/// the wire are fixed for compatibility with existing clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Originating participant (used only for logging)
    #[serde(rename = "SenderKey", default, deserialize_with = "crate::codec::string_or_null")]
    pub sender_key: String,
    /// Intended recipient; absent in the baseline message variant
    #[serde(
        rename = "ReceiverKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub receiver_key: Option<String>,
    /// Ciphertext
    #[serde(rename = "Content", default, with = "crate::codec")]
    pub content: Vec<u8>,
    /// Nonce paired with `content`
    #[serde(rename = "Nonce", default, with = "crate::codec")]
    pub nonce: Vec<u8>,
    /// Sender's signature over `content` and `nonce`
    #[serde(rename = "Signature", default, with = "crate::codec")]
    pub signature: Vec<u8>,
}

impl Envelope {
    /// Create an envelope addressed to `receiver_key`.
    pub fn new(
        sender_key: impl Into<String>,
        receiver_key: impl Into<String>,
        content: Vec<u8>,
        nonce: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            sender_key: sender_key.into(),
            receiver_key: Some(receiver_key.into()),
            content,
            nonce,
            signature,
        }
    }

    /// Decode an envelope from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(text).map_err(EnvelopeError::Decode)
    }

    /// Encode the envelope as a JSON text frame.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// Receiver key for display, empty when absent.
    pub fn receiver(&self) -> &str {
        self.receiver_key.as_deref().unwrap_or("")
    }
}

/// Abbreviate a participant key for log output.
///
/// Keys longer than six characters keep their first six followed by `...`.
pub fn short_key(key: &str) -> String {
    match key.char_indices().nth(6) {
        Some((idx, _)) => format!("{}...", &key[..idx]),
        None => key.to_string(),
    }
}
