//! Outbound half of a client connection.
//!
//! The registry owns one [`PeerSink`] per connection; the session task owns
//! the matching inbound half. Broadcast only ever writes through this trait,
//! which keeps the fan-out independent of the WebSocket types and lets tests
//! substitute slow or failing peers.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

/// Per-destination delivery errors.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The write did not complete before the deadline.
    #[error("write deadline of {0:?} exceeded")]
    Timeout(Duration),

    /// The destination is already closed.
    #[error("connection closed")]
    Closed,

    /// Transport-level write error.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
}

/// Write side of a connection.
#[async_trait]
pub trait PeerSink: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), DeliveryError>;

    /// Send a close frame with `code` and `reason`, then close the channel.
    async fn shutdown(&mut self, code: u16, reason: &'static str) -> Result<(), DeliveryError>;

    /// Flush the reply to a close frame the peer already sent, then close
    /// the channel.
    async fn finish(&mut self) -> Result<(), DeliveryError>;
}

/// [`PeerSink`] over the write half of an axum WebSocket.
pub struct WebSocketPeer {
    sink: SplitSink<WebSocket, Message>,
}

impl WebSocketPeer {
    /// Wrap the write half of a split WebSocket.
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

impl std::fmt::Debug for WebSocketPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketPeer").finish_non_exhaustive()
    }
}

#[async_trait]
impl PeerSink for WebSocketPeer {
    async fn send_text(&mut self, text: &str) -> Result<(), DeliveryError> {
        self.sink.send(Message::Text(text.to_owned())).await?;
        Ok(())
    }

    async fn shutdown(&mut self, code: u16, reason: &'static str) -> Result<(), DeliveryError> {
        let frame = CloseFrame {
            code,
            reason: Cow::Borrowed(reason),
        };
        self.sink.send(Message::Close(Some(frame))).await?;
        self.sink.close().await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), DeliveryError> {
        // The reply is queued by the read half; closing the sink writes it out.
        self.sink.close().await?;
        Ok(())
    }
}
