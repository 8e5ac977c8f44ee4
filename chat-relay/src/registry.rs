//! Registry of connections eligible for broadcast.
//!
//! A single async mutex guards membership changes and the broadcast
//! traversal, so a fan-out never observes a connection mid-removal and never
//! targets one whose removal completed before it started.

use crate::peer::PeerSink;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Identifies one accepted connection for its whole lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new random ConnectionId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", &self.0.simple().to_string()[..8])
    }
}

/// Registered connections, keyed by id.
pub type Members = HashMap<ConnectionId, Box<dyn PeerSink>>;

/// Thread-safe membership tracking for active connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    members: Mutex<Members>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ConnectionRegistry");
        // try_lock: Debug must not wait behind an in-flight broadcast
        match self.members.try_lock() {
            Ok(members) => s.field("members", &members.len()),
            Err(_) => s.field("members", &"<locked>"),
        };
        s.finish()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound half of a connection.
    ///
    /// Returns `false` and keeps the existing entry if `id` is already present.
    pub async fn add(&self, id: ConnectionId, sink: Box<dyn PeerSink>) -> bool {
        let mut members = self.members.lock().await;
        let added = match members.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(sink);
                true
            }
            Entry::Occupied(_) => false,
        };

        if added {
            tracing::info!("New client connected: {} (total: {})", id, members.len());
        }
        added
    }

    /// Unregister a connection, handing its outbound half back for closing.
    ///
    /// Returns `None` if the connection was not registered.
    pub async fn remove(&self, id: &ConnectionId) -> Option<Box<dyn PeerSink>> {
        let mut members = self.members.lock().await;
        let removed = members.remove(id);

        if removed.is_some() {
            tracing::info!("Client disconnected: {} (remaining: {})", id, members.len());
        }
        removed
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.members.lock().await.contains_key(id)
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// Acquire the membership lock.
    ///
    /// While the guard lives, no connection can be added or removed.
    pub async fn lock(&self) -> MutexGuard<'_, Members> {
        self.members.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::testing::ChannelPeer;
    use std::sync::Arc;

    fn peer() -> Box<dyn PeerSink> {
        let (peer, _rx) = ChannelPeer::new();
        Box::new(peer)
    }

    #[tokio::test]
    async fn add_and_remove_connection() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::random();

        assert!(registry.add(id, peer()).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(&id).await);

        assert!(registry.remove(&id).await.is_some());
        assert!(registry.is_empty().await);
        assert!(!registry.contains(&id).await);
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::random();

        assert!(registry.add(id, peer()).await);
        assert!(!registry.add(id, peer()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn double_remove_is_noop() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::random();
        registry.add(id, peer()).await;

        assert!(registry.remove(&id).await.is_some());
        assert!(registry.remove(&id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn remove_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.add(ConnectionId::random(), peer()).await;

        assert!(registry.remove(&ConnectionId::random()).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_membership_changes_stay_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let ids: Vec<ConnectionId> = (0..64).map(|_| ConnectionId::random()).collect();

        let mut tasks = Vec::new();
        for (n, id) in ids.iter().copied().enumerate() {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.add(id, peer()).await;
                if n % 2 == 0 {
                    registry.remove(&id).await;
                    registry.remove(&id).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len().await, 32);
        for (n, id) in ids.iter().enumerate() {
            assert_eq!(registry.contains(id).await, n % 2 == 1);
        }
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::random(), ConnectionId::random());
    }

    #[tokio::test]
    async fn debug_reports_member_count() {
        let registry = ConnectionRegistry::new();
        registry.add(ConnectionId::random(), peer()).await;
        assert!(format!("{:?}", registry).contains("members: 1"));
    }
}
