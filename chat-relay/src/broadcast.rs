//! Fan-out of one envelope to every registered connection.
//!
//! The registry lock is held for the whole fan-out. Each write is bounded by
//! the configured deadline, so one broadcast costs at most
//! `members * write_timeout`. A failed or expired write is logged and
//! skipped; the destination stays registered until its own session ends.

use crate::peer::{DeliveryError, PeerSink};
use crate::registry::ConnectionRegistry;
use chat_types::Envelope;
use std::sync::Arc;
use std::time::Duration;

/// Outcome counters for one broadcast. Logged, never sent to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Destinations a write was attempted on.
    pub attempted: usize,
    /// Writes that completed.
    pub delivered: usize,
    /// Writes that failed or hit the deadline.
    pub failed: usize,
}

/// Delivers envelopes to every member of a [`ConnectionRegistry`].
#[derive(Debug, Clone)]
pub struct BroadcastRelay {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
}

impl BroadcastRelay {
    /// Create a broadcaster over `registry` with a per-write deadline.
    pub fn new(registry: Arc<ConnectionRegistry>, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    /// The registry this broadcaster fans out to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Per-destination write deadline.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Write `envelope` to every connection registered when the lock is taken.
    pub async fn broadcast(&self, envelope: &Envelope) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        // Serialize once; every destination gets the same frame.
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to serialize envelope: {}", e);
                return report;
            }
        };

        let mut members = self.registry.lock().await;
        for (id, sink) in members.iter_mut() {
            report.attempted += 1;
            match deliver(sink.as_mut(), &text, self.write_timeout).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Failed to write to client {}: {}", id, e);
                }
            }
        }
        drop(members);

        tracing::debug!(
            "Broadcast {} bytes: delivered {}/{} ({} failed)",
            text.len(),
            report.delivered,
            report.attempted,
            report.failed
        );
        report
    }
}

/// Write one frame, giving up after `deadline`.
async fn deliver(
    sink: &mut dyn PeerSink,
    text: &str,
    deadline: Duration,
) -> Result<(), DeliveryError> {
    match tokio::time::timeout(deadline, sink.send_text(text)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::testing::{BrokenPeer, ChannelPeer, StalledPeer};
    use crate::registry::ConnectionId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;

    const DEADLINE: Duration = Duration::from_secs(5);

    fn envelope() -> Envelope {
        Envelope::new("a1", "b1", vec![0x01, 0x02], vec![0x00], vec![0xFF])
    }

    async fn add_channel_peer(
        registry: &ConnectionRegistry,
    ) -> (ConnectionId, UnboundedReceiver<String>) {
        let id = ConnectionId::random();
        let (peer, rx) = ChannelPeer::new();
        registry.add(id, Box::new(peer)).await;
        (id, rx)
    }

    async fn add_stalled_peer(registry: &ConnectionRegistry) -> (ConnectionId, Arc<AtomicUsize>) {
        let id = ConnectionId::random();
        let attempts = Arc::new(AtomicUsize::new(0));
        let peer = StalledPeer {
            attempts: Arc::clone(&attempts),
        };
        registry.add(id, Box::new(peer)).await;
        (id, attempts)
    }

    fn relay(registry: &Arc<ConnectionRegistry>) -> BroadcastRelay {
        BroadcastRelay::new(Arc::clone(registry), DEADLINE)
    }

    #[tokio::test]
    async fn fan_out_reaches_every_member() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut receivers = Vec::new();
        for _ in 0..5 {
            receivers.push(add_channel_peer(&registry).await.1);
        }

        let report = relay(&registry).broadcast(&envelope()).await;
        assert_eq!(
            report,
            BroadcastReport {
                attempted: 5,
                delivered: 5,
                failed: 0
            }
        );

        let expected = envelope().to_json().unwrap();
        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), expected);
            assert!(rx.try_recv().is_err(), "exactly one delivery per member");
        }
    }

    #[tokio::test]
    async fn payload_bytes_arrive_unchanged() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_, mut rx) = add_channel_peer(&registry).await;

        let content: Vec<u8> = (0..=255u8).rev().collect();
        let sent = Envelope::new("sender-key", "receiver-key", content, vec![0; 24], vec![0xAB; 64]);
        relay(&registry).broadcast(&sent).await;

        let received = Envelope::from_json(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn empty_registry_is_a_noop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let report = relay(&registry).broadcast(&envelope()).await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_costs_at_most_one_deadline() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_, mut rx_a) = add_channel_peer(&registry).await;
        let (_, mut rx_b) = add_channel_peer(&registry).await;
        let (stalled_id, attempts) = add_stalled_peer(&registry).await;

        let start = Instant::now();
        let report = relay(&registry).broadcast(&envelope()).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= DEADLINE, "stalled write must run to the deadline");
        assert!(elapsed < DEADLINE + Duration::from_secs(1));
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        // Broadcast never evicts; the session's own read loop does.
        assert!(registry.contains(&stalled_id).await);
    }

    #[tokio::test]
    async fn failed_write_does_not_abort_or_evict() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broken_id = ConnectionId::random();
        let attempts = Arc::new(AtomicUsize::new(0));
        registry
            .add(
                broken_id,
                Box::new(BrokenPeer {
                    attempts: Arc::clone(&attempts),
                }),
            )
            .await;
        let (_, mut rx) = add_channel_peer(&registry).await;

        let report = relay(&registry).broadcast(&envelope()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(rx.try_recv().is_ok());
        assert!(registry.contains(&broken_id).await);

        // Skipped for that message only; the next broadcast tries again.
        relay(&registry).broadcast(&envelope()).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn removed_connection_is_not_targeted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (gone, mut rx_gone) = add_channel_peer(&registry).await;
        let (_, mut rx_kept) = add_channel_peer(&registry).await;

        registry.remove(&gone).await;
        let report = relay(&registry).broadcast(&envelope()).await;

        assert_eq!(report.attempted, 1);
        assert!(rx_kept.try_recv().is_ok());
        assert!(rx_gone.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcasts_from_one_sender_keep_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_, mut rx) = add_channel_peer(&registry).await;
        let relay = relay(&registry);

        for n in 0..10u8 {
            relay
                .broadcast(&Envelope::new("a1", "b1", vec![n], vec![], vec![]))
                .await;
        }
        for n in 0..10u8 {
            let env = Envelope::from_json(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(env.content, vec![n]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn membership_changes_wait_for_in_flight_broadcast() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (early, mut rx_early) = add_channel_peer(&registry).await;
        let (_, attempts) = add_stalled_peer(&registry).await;

        let relay = Arc::new(relay(&registry));
        let broadcast = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move { relay.broadcast(&envelope()).await }
        });

        // Wait until the fan-out holds the lock and is blocked on the stalled peer.
        while attempts.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let late = ConnectionId::random();
        let (late_peer, mut rx_late) = ChannelPeer::new();
        let add = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.add(late, Box::new(late_peer)).await }
        });
        let remove = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.remove(&early).await.is_some() }
        });

        let report = broadcast.await.unwrap();
        assert_eq!(report.attempted, 2);
        assert!(add.await.unwrap());
        assert!(remove.await.unwrap());

        // Removed after the snapshot: still got its best-effort copy.
        assert!(rx_early.try_recv().is_ok());
        // Added after the snapshot: not a target of that broadcast.
        assert!(rx_late.try_recv().is_err());
        assert!(registry.contains(&late).await);
        assert!(!registry.contains(&early).await);
    }
}
