//! Error types for chat-relay.

/// Main error type for relay startup and operation.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The address that could not be bound.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a session ends other than a normal closure.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A text frame did not contain a valid envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] chat_types::EnvelopeError),

    /// A binary frame was received; envelopes travel as text.
    #[error("unsupported data: expected text message")]
    UnsupportedData,

    /// The peer closed with a non-normal status code.
    #[error("closed by peer with status {code}: {reason}")]
    AbnormalClose {
        /// Close status code sent by the peer.
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// The stream ended without a close frame.
    #[error("connection dropped without close frame")]
    Dropped,

    /// A frame exceeded the configured message size limit.
    #[error("message too big: {0}")]
    MessageTooBig(#[source] axum::Error),

    /// Transport-level read error.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
}

impl ProtocolError {
    /// Classify an error returned while reading from the WebSocket.
    pub fn from_read(err: axum::Error) -> Self {
        use tungstenite::error::CapacityError;

        let too_big = std::error::Error::source(&err)
            .and_then(|source| source.downcast_ref::<tungstenite::Error>())
            .is_some_and(|e| {
                matches!(
                    e,
                    tungstenite::Error::Capacity(CapacityError::MessageTooLong { .. })
                )
            });
        if too_big {
            Self::MessageTooBig(err)
        } else {
            Self::Transport(err)
        }
    }

    /// WebSocket close code the relay answers with for this error.
    pub fn close_code(&self) -> u16 {
        use axum::extract::ws::close_code;
        match self {
            Self::InvalidEnvelope(_) => close_code::INVALID,
            Self::UnsupportedData => close_code::UNSUPPORTED,
            Self::MessageTooBig(_) => close_code::SIZE,
            Self::AbnormalClose { .. } | Self::Dropped | Self::Transport(_) => close_code::ERROR,
        }
    }

    /// WebSocket close reason the relay answers with for this error.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::InvalidEnvelope(_) => "failed to unmarshal JSON",
            Self::UnsupportedData => "expected text message",
            Self::MessageTooBig(_) => "message too big",
            Self::AbnormalClose { .. } | Self::Dropped | Self::Transport(_) => "",
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for session protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
