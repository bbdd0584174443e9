//! Per-connection state: outbound queue, attributes, permissions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use specmux_core::ConnectionId;

/// Lifecycle of a connection as seen by the multiplexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Registered, handler not yet notified.
    Connecting = 0,
    /// Handler notified, queue drains on writability.
    Established = 1,
    /// Being torn down after a write failure.
    Closing = 2,
    /// Removed from the registry. Terminal.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Established,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A live client session.
///
/// Any thread may enqueue, read attributes, or check permissions. Only the
/// reactor thread pops from the outbound queue.
pub struct Connection {
    /// Engine-assigned identifier.
    pub id: ConnectionId,
    /// When the engine reported the connection as established.
    pub created_at: DateTime<Utc>,
    state: AtomicU8,
    outbound: Mutex<VecDeque<Arc<str>>>,
    attributes: Mutex<HashMap<String, String>>,
    permissions: Mutex<HashSet<String>>,
    /// Queue limit, 0 = unlimited.
    max_queue_depth: usize,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create a connection with an unbounded queue.
    pub fn new(id: ConnectionId) -> Self {
        Self::with_max_queue_depth(id, 0)
    }

    /// Create a connection whose queue holds at most `max_queue_depth`
    /// messages (0 = unlimited).
    pub fn with_max_queue_depth(id: ConnectionId, max_queue_depth: usize) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound: Mutex::new(VecDeque::new()),
            attributes: Mutex::new(HashMap::new()),
            permissions: Mutex::new(HashSet::new()),
            max_queue_depth,
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether messages may still be queued for this connection.
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Established
        )
    }

    /// Append a message to the outbound queue. Never blocks on I/O.
    ///
    /// Returns `false` if the connection is closing or the queue is at its
    /// limit. A full queue also increments the drop counter.
    pub fn enqueue(&self, message: Arc<str>) -> bool {
        if !self.is_open() {
            return false;
        }
        let mut queue = self.outbound.lock();
        if self.max_queue_depth > 0 && queue.len() >= self.max_queue_depth {
            drop(queue);
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        queue.push_back(message);
        true
    }

    /// Head of the outbound queue without removing it.
    pub fn front(&self) -> Option<Arc<str>> {
        self.outbound.lock().front().cloned()
    }

    /// Pop the head of the outbound queue.
    pub fn drain_ready(&self) -> Option<Arc<str>> {
        self.outbound.lock().pop_front()
    }

    /// Number of queued outbound messages.
    pub fn queue_len(&self) -> usize {
        self.outbound.lock().len()
    }

    /// Discard every queued message, returning how many were dropped.
    pub(crate) fn clear_queue(&self) -> usize {
        let mut queue = self.outbound.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    /// Total messages dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the connection holds `tag`.
    pub fn has_permission(&self, tag: &str) -> bool {
        self.permissions.lock().contains(tag)
    }

    /// Grant `tag`. Returns `true` if it was not already held.
    pub fn grant_permission(&self, tag: &str) -> bool {
        self.permissions.lock().insert(tag.to_string())
    }

    /// Revoke `tag`. Returns `true` if it was held.
    pub fn revoke_permission(&self, tag: &str) -> bool {
        self.permissions.lock().remove(tag)
    }

    /// Attribute value for `key`, or an empty string when unset.
    pub fn attribute(&self, key: &str) -> String {
        self.attributes.lock().get(key).cloned().unwrap_or_default()
    }

    /// Set an attribute, replacing any previous value.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.attributes.lock().insert(key.into(), value.into());
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .field("queued", &self.queue_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_connection() -> Connection {
        Connection::new(ConnectionId::new(1))
    }

    fn msg(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn create_connection() {
        let conn = make_connection();
        assert_eq!(conn.id, ConnectionId::new(1));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.queue_len(), 0);
        assert!(conn.created_at <= Utc::now());
    }

    #[test]
    fn enqueue_then_drain_is_fifo() {
        let conn = make_connection();
        assert!(conn.enqueue(msg("A")));
        assert!(conn.enqueue(msg("B")));
        assert_eq!(conn.drain_ready().as_deref(), Some("A"));
        assert_eq!(conn.drain_ready().as_deref(), Some("B"));
        assert!(conn.drain_ready().is_none());
    }

    #[test]
    fn front_does_not_pop() {
        let conn = make_connection();
        let _ = conn.enqueue(msg("A"));
        assert_eq!(conn.front().as_deref(), Some("A"));
        assert_eq!(conn.queue_len(), 1);
    }

    #[test]
    fn unlimited_queue_accepts_many() {
        let conn = make_connection();
        for i in 0..10_000 {
            assert!(conn.enqueue(msg(&i.to_string())));
        }
        assert_eq!(conn.queue_len(), 10_000);
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let conn = Connection::with_max_queue_depth(ConnectionId::new(2), 2);
        assert!(conn.enqueue(msg("a")));
        assert!(conn.enqueue(msg("b")));
        assert!(!conn.enqueue(msg("c")));
        assert_eq!(conn.queue_len(), 2);
        assert_eq!(conn.drop_count(), 1);
        // Oldest messages survive.
        assert_eq!(conn.front().as_deref(), Some("a"));
    }

    #[test]
    fn closing_connection_rejects_enqueue() {
        let conn = make_connection();
        conn.set_state(ConnectionState::Closing);
        assert!(!conn.enqueue(msg("late")));
        assert_eq!(conn.queue_len(), 0);
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn clear_queue_reports_count() {
        let conn = make_connection();
        let _ = conn.enqueue(msg("a"));
        let _ = conn.enqueue(msg("b"));
        assert_eq!(conn.clear_queue(), 2);
        assert_eq!(conn.queue_len(), 0);
    }

    #[test]
    fn permissions_grant_and_revoke() {
        let conn = make_connection();
        assert!(!conn.has_permission("logs"));
        assert!(conn.grant_permission("logs"));
        assert!(!conn.grant_permission("logs"));
        assert!(conn.has_permission("logs"));
        assert!(conn.revoke_permission("logs"));
        assert!(!conn.revoke_permission("logs"));
        assert!(!conn.has_permission("logs"));
    }

    #[test]
    fn missing_attribute_is_empty() {
        let conn = make_connection();
        assert_eq!(conn.attribute("user"), "");
    }

    #[test]
    fn attribute_overwrite() {
        let conn = make_connection();
        conn.set_attribute("user", "alice");
        conn.set_attribute("user", "bob");
        assert_eq!(conn.attribute("user"), "bob");
    }

    #[test]
    fn state_roundtrip() {
        let conn = make_connection();
        for state in [
            ConnectionState::Established,
            ConnectionState::Closing,
            ConnectionState::Closed,
            ConnectionState::Connecting,
        ] {
            conn.set_state(state);
            assert_eq!(conn.state(), state);
        }
    }

    #[test]
    fn enqueue_from_many_threads() {
        let conn = Arc::new(make_connection());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let conn = Arc::clone(&conn);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let _ = conn.enqueue(Arc::from(format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(conn.queue_len(), 1000);
    }

    proptest! {
        #[test]
        fn drain_preserves_enqueue_order(messages in proptest::collection::vec("[a-z]{0,8}", 0..64)) {
            let conn = make_connection();
            for m in &messages {
                prop_assert!(conn.enqueue(Arc::from(m.as_str())));
            }
            let mut drained = Vec::new();
            while let Some(m) = conn.drain_ready() {
                drained.push(m.to_string());
            }
            prop_assert_eq!(drained, messages);
        }
    }
}
