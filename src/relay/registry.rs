//! Connection registry: the peer links this node currently holds
//!
//! The registry records membership only. Transports register a handle once
//! the WebSocket is up and remove it when the read loop ends; the relay
//! reads it through `snapshot()`.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{ConnectionId, SharedConnection};

/// Thread-safe registry of peer connections
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, SharedConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection, replacing any previous handle with the same id
    pub fn register(&self, connection: SharedConnection) {
        self.connections.write().insert(connection.id(), connection);
    }

    /// Remove a connection by id
    pub fn remove(&self, id: ConnectionId) -> Option<SharedConnection> {
        self.connections.write().remove(&id)
    }

    #[cfg(test)]
    pub fn get(&self, id: ConnectionId) -> Option<SharedConnection> {
        self.connections.read().get(&id).cloned()
    }

    /// Copy of the current membership
    ///
    /// The lock is released before this returns, so callers may iterate,
    /// await, or spawn while other tasks register and remove connections.
    pub fn snapshot(&self) -> Vec<SharedConnection> {
        self.connections.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Number of registered connections currently open
    pub fn open_count(&self) -> usize {
        self.connections.read().values().filter(|c| c.is_open()).count()
    }

    /// Close and drop every connection; returns how many were held
    pub fn close_all(&self) -> usize {
        let mut connections = self.connections.write();
        for conn in connections.values() {
            conn.close();
        }
        let count = connections.len();
        connections.clear();
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{ChannelConnection, Connection};
    use std::sync::Arc;

    fn make_conn() -> (SharedConnection, tokio::sync::mpsc::Receiver<crate::protocol::OutboundFrame>) {
        let (conn, rx) = ChannelConnection::new("test-peer", 4);
        (conn as SharedConnection, rx)
    }

    #[test]
    fn test_register_and_get() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_conn();
        let id = conn.id();

        registry.register(conn);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).unwrap().id(), id);
    }

    #[test]
    fn test_remove() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_conn();
        let id = conn.id();
        registry.register(conn);

        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
        assert!(registry.get(id).is_none());
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn test_snapshot_is_detached_from_later_mutation() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = make_conn();
        let (b, _rb) = make_conn();
        let a_id = a.id();
        registry.register(a);
        registry.register(b);

        let snapshot = registry.snapshot();

        // Mutate while the snapshot is held
        registry.remove(a_id);
        let (c, _rc) = make_conn();
        registry.register(c);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|conn| conn.id() == a_id));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_open_count() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = make_conn();
        let (b, _rb) = make_conn();
        b.close();
        registry.register(a);
        registry.register(b);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.open_count(), 1);
    }

    #[test]
    fn test_close_all() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = ChannelConnection::new("peer", 1);
        registry.register(Arc::clone(&conn) as SharedConnection);

        assert_eq!(registry.close_all(), 1);
        assert!(registry.is_empty());
        assert!(!conn.is_open());
    }

    #[test]
    fn test_concurrent_register_during_snapshot_iteration() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut receivers = Vec::new();
        for _ in 0..16 {
            let (conn, rx) = make_conn();
            registry.register(conn);
            receivers.push(rx);
        }

        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let mut held = Vec::new();
                for _ in 0..200 {
                    let (conn, rx) = ChannelConnection::new("churn", 1);
                    let id = conn.id();
                    registry.register(conn);
                    registry.remove(id);
                    held.push(rx);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = registry.snapshot();
            assert!(snapshot.len() >= 16);
        }

        writer.join().unwrap();
        assert_eq!(registry.len(), 16);
    }
}
