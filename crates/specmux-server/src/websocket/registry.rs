//! Live connection set keyed by engine id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use specmux_core::ConnectionId;

use super::connection::Connection;
use crate::errors::{MuxError, Result};

/// Owns every live [`Connection`].
///
/// Critical sections only cover map lookups and inserts. Callers receive
/// an `Arc<Connection>` and do their work after the lock is released.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    /// Avoids read-locking for count queries.
    active_count: AtomicUsize,
    /// Queue limit applied to new connections, 0 = unlimited.
    max_queue_depth: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry with unbounded connection queues.
    pub fn new() -> Self {
        Self::with_max_queue_depth(0)
    }

    /// Create an empty registry whose connections cap their queues at
    /// `max_queue_depth` messages (0 = unlimited).
    pub fn with_max_queue_depth(max_queue_depth: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            max_queue_depth,
        }
    }

    /// Create and insert a connection for `id`.
    pub fn register(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        let mut conns = self.connections.write();
        if conns.contains_key(&id) {
            return Err(MuxError::DuplicateConnection(id));
        }
        let conn = Arc::new(Connection::with_max_queue_depth(id, self.max_queue_depth));
        let _ = conns.insert(id, Arc::clone(&conn));
        let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    /// Remove the connection for `id` and return it.
    pub fn unregister(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        let removed = self.connections.write().remove(&id);
        match removed {
            Some(conn) => {
                let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                Ok(conn)
            }
            None => Err(MuxError::UnknownConnection(id)),
        }
    }

    /// Look up a live connection.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Apply `f` to every connection live at the time of the call.
    ///
    /// Iterates a snapshot, so `f` may unregister connections (including
    /// the current one) without skipping siblings.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Connection>)) {
        for conn in &self.snapshot() {
            f(conn);
        }
    }

    /// Clone out the current set of connections.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Whether no connections are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn id(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[test]
    fn register_connection() {
        let reg = ConnectionRegistry::new();
        let conn = reg.register(id(1)).unwrap();
        assert_eq!(conn.id, id(1));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(id(1)));
    }

    #[test]
    fn duplicate_register_fails() {
        let reg = ConnectionRegistry::new();
        let _ = reg.register(id(1)).unwrap();
        let err = reg.register(id(1)).unwrap_err();
        assert_matches!(err, MuxError::DuplicateConnection(i) if i == id(1));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unregister_connection() {
        let reg = ConnectionRegistry::new();
        let _ = reg.register(id(1)).unwrap();
        let removed = reg.unregister(id(1)).unwrap();
        assert_eq!(removed.id, id(1));
        assert!(reg.is_empty());
        assert!(reg.get(id(1)).is_none());
    }

    #[test]
    fn unregister_unknown_fails() {
        let reg = ConnectionRegistry::new();
        let err = reg.unregister(id(9)).unwrap_err();
        assert_matches!(err, MuxError::UnknownConnection(i) if i == id(9));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn id_reusable_after_unregister() {
        let reg = ConnectionRegistry::new();
        let first = reg.register(id(1)).unwrap();
        first.set_attribute("user", "alice");
        let _ = reg.unregister(id(1)).unwrap();
        let second = reg.register(id(1)).unwrap();
        assert_eq!(second.attribute("user"), "");
    }

    #[test]
    fn get_missing_is_none() {
        let reg = ConnectionRegistry::new();
        assert!(reg.get(id(3)).is_none());
    }

    #[test]
    fn queue_limit_applies_to_new_connections() {
        let reg = ConnectionRegistry::with_max_queue_depth(1);
        let conn = reg.register(id(1)).unwrap();
        assert!(conn.enqueue(Arc::from("a")));
        assert!(!conn.enqueue(Arc::from("b")));
    }

    #[test]
    fn for_each_visits_all() {
        let reg = ConnectionRegistry::new();
        for n in 1..=3 {
            let _ = reg.register(id(n)).unwrap();
        }
        let mut seen = HashSet::new();
        reg.for_each(|c| {
            let _ = seen.insert(c.id);
        });
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn for_each_tolerates_removal() {
        let reg = ConnectionRegistry::new();
        for n in 1..=4 {
            let _ = reg.register(id(n)).unwrap();
        }
        let mut visited = 0;
        reg.for_each(|c| {
            visited += 1;
            let _ = reg.unregister(c.id).unwrap();
        });
        assert_eq!(visited, 4);
        assert!(reg.is_empty());
    }

    #[test]
    fn default_registry_is_empty() {
        let reg = ConnectionRegistry::default();
        assert!(reg.is_empty());
        assert!(reg.snapshot().is_empty());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Register(u64),
        Unregister(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..8).prop_map(Op::Register),
            (0u64..8).prop_map(Op::Unregister),
        ]
    }

    proptest! {
        #[test]
        fn get_reflects_last_lifecycle_op(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let reg = ConnectionRegistry::new();
            let mut live = HashSet::new();
            for op in ops {
                match op {
                    Op::Register(n) => {
                        let result = reg.register(id(n));
                        prop_assert_eq!(result.is_ok(), live.insert(n));
                    }
                    Op::Unregister(n) => {
                        let result = reg.unregister(id(n));
                        prop_assert_eq!(result.is_ok(), live.remove(&n));
                    }
                }
            }
            for n in 0u64..8 {
                prop_assert_eq!(reg.get(id(n)).is_some(), live.contains(&n));
            }
            prop_assert_eq!(reg.len(), live.len());
        }
    }
}
