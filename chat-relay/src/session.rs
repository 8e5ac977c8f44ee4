//! Per-connection session loop.
//!
//! Each accepted WebSocket gets a Session running on its own task. The
//! session registers the write half, reads envelopes in order and hands each
//! one to the broadcaster, and unregisters exactly once when reading stops.

use crate::broadcast::BroadcastRelay;
use crate::error::{ProtocolError, ProtocolResult};
use crate::peer::{PeerSink, WebSocketPeer};
use crate::registry::ConnectionId;
use axum::extract::ws::{close_code, Message, WebSocket};
use chat_types::{short_key, Envelope};
use futures_util::{Stream, StreamExt};

/// Session state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, not yet registered.
    Connecting,
    /// Registered and reading envelopes.
    Active,
    /// Unregistered; terminal.
    Closed,
}

/// A per-connection session.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    relay: BroadcastRelay,
    state: SessionState,
}

impl Session {
    /// Create a new session that will broadcast through `relay`.
    pub fn new(relay: BroadcastRelay) -> Self {
        Self {
            id: ConnectionId::random(),
            relay,
            state: SessionState::Connecting,
        }
    }

    /// The id this session registers under.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Run the session over an upgraded WebSocket until it closes.
    pub async fn run(self, socket: WebSocket) -> ProtocolResult<()> {
        let (sink, stream) = socket.split();
        self.drive(Box::new(WebSocketPeer::new(sink)), stream).await
    }

    /// Run the session over an already split connection.
    ///
    /// Returns `Ok(())` after a normal closure from the peer, otherwise the
    /// reason the session ended.
    pub async fn drive<S>(mut self, sink: Box<dyn PeerSink>, mut stream: S) -> ProtocolResult<()>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    {
        let registry = self.relay.registry().clone();
        registry.add(self.id, sink).await;
        self.transition(SessionState::Active);

        let outcome = self.read_loop(&mut stream).await;

        self.transition(SessionState::Closed);
        let sink = registry.remove(&self.id).await;

        if let Some(sink) = sink {
            self.close_sink(sink, outcome.as_ref().err()).await;
        }

        outcome
    }

    /// Read and broadcast envelopes until the connection ends.
    async fn read_loop<S>(&self, stream: &mut S) -> ProtocolResult<()>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    {
        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(ProtocolError::from_read(e)),
                None => return Err(ProtocolError::Dropped),
            };

            match message {
                Message::Text(text) => {
                    let envelope = Envelope::from_json(&text)?;
                    tracing::info!(
                        "Msg from {} to {}",
                        short_key(&envelope.sender_key),
                        short_key(envelope.receiver())
                    );
                    self.relay.broadcast(&envelope).await;
                }
                Message::Binary(_) => return Err(ProtocolError::UnsupportedData),
                Message::Close(Some(frame)) if frame.code == close_code::NORMAL => return Ok(()),
                Message::Close(Some(frame)) => {
                    return Err(ProtocolError::AbnormalClose {
                        code: frame.code,
                        reason: frame.reason.into_owned(),
                    })
                }
                Message::Close(None) => {
                    return Err(ProtocolError::AbnormalClose {
                        code: close_code::STATUS,
                        reason: String::new(),
                    })
                }
                // Keepalive is answered by the WebSocket layer.
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }

    /// Best-effort close of the write half, bounded by the write deadline.
    ///
    /// Without an error the peer started the close handshake and only the
    /// queued reply is flushed; otherwise a close frame for `reason` is sent.
    async fn close_sink(&self, mut sink: Box<dyn PeerSink>, reason: Option<&ProtocolError>) {
        let deadline = self.relay.write_timeout();
        let closing = match reason {
            None => sink.finish(),
            Some(e) => sink.shutdown(e.close_code(), e.close_reason()),
        };
        match tokio::time::timeout(deadline, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Close frame to {} not sent: {}", self.id, e),
            Err(_) => tracing::debug!("Close frame to {} timed out", self.id),
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}
