//! Bookkeeping of the server's open connections.

use std::collections::HashMap;
use std::net::SocketAddr;

use ackwire_transport::ConnectionId;
use tokio::sync::Mutex;

/// What the registry remembers about one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer: SocketAddr,
    pub secure: bool,
}

/// The set of connections the server currently has open.
///
/// Diagnostics only: nothing routes messages through it, and every
/// connection is served independently. Connection tasks insert themselves
/// on accept and remove themselves when they end, concurrently, so the
/// map sits behind a mutex.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    open: Mutex<HashMap<ConnectionId, ConnectionInfo>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an open connection. Returns the new count.
    pub async fn insert(&self, id: ConnectionId, info: ConnectionInfo) -> usize {
        let mut open = self.open.lock().await;
        open.insert(id, info);
        open.len()
    }

    /// Forgets a connection. Returns whether it was present.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        self.open.lock().await.remove(&id).is_some()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.open.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.open.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// A point-in-time copy of the open connection ids.
    pub async fn snapshot(&self) -> Vec<ConnectionId> {
        self.open.lock().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            peer: "127.0.0.1:9000".parse().unwrap(),
            secure: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty().await);

        assert_eq!(registry.insert(ConnectionId::new(1), info()).await, 1);
        assert_eq!(registry.insert(ConnectionId::new(2), info()).await, 2);
        assert!(registry.contains(ConnectionId::new(1)).await);

        assert!(registry.remove(ConnectionId::new(1)).await);
        assert!(!registry.remove(ConnectionId::new(1)).await);
        assert_eq!(registry.snapshot().await, vec![ConnectionId::new(2)]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_all_kept() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();
        for i in 0..64 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.insert(ConnectionId::new(i), info()).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.len().await, 64);
    }
}
