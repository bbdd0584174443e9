//! Targeted sends and fan-out to connected clients.

use std::sync::Arc;

use metrics::counter;
use specmux_core::ConnectionId;
use tracing::{debug, warn};

use super::connection::Connection;
use super::registry::ConnectionRegistry;
use crate::errors::{MuxError, Result};
use crate::metrics::{WS_BROADCAST_RECIPIENTS_TOTAL, WS_QUEUE_DROPS_TOTAL};

/// Cheap, cloneable handle for producers to reach connections.
///
/// Every method only appends to in-memory queues. Delivery happens on the
/// reactor thread when the connection becomes writable.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    /// Create a router over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Queue `message` for one connection.
    ///
    /// Returns `false` if the connection is gone or its queue is full. A
    /// missing connection is expected when sends race with disconnects.
    pub fn send_to(&self, id: ConnectionId, message: impl Into<Arc<str>>) -> bool {
        let Some(conn) = self.registry.get(id) else {
            debug!(conn_id = %id, "send to closed connection ignored");
            return false;
        };
        let queued = conn.enqueue(message.into());
        if !queued && conn.is_open() {
            counter!(WS_QUEUE_DROPS_TOTAL).increment(1);
            warn!(
                conn_id = %id,
                total_drops = conn.drop_count(),
                "connection queue full, message dropped"
            );
        }
        queued
    }

    /// Queue `message` for every live connection. Returns the number of
    /// connections that accepted it.
    pub fn broadcast(&self, message: impl Into<Arc<str>>) -> usize {
        self.fan_out(|_| true, &message.into(), "all")
    }

    /// Queue `message` for every live connection holding `tag`.
    pub fn broadcast_to_permission(&self, message: impl Into<Arc<str>>, tag: &str) -> usize {
        self.fan_out(|c| c.has_permission(tag), &message.into(), tag)
    }

    /// Enqueue a shared message on each matching connection.
    fn fan_out(
        &self,
        filter: impl Fn(&Connection) -> bool,
        message: &Arc<str>,
        label: &str,
    ) -> usize {
        let mut recipients = 0usize;
        let mut drops = 0u64;
        self.registry.for_each(|conn| {
            if !filter(conn) {
                return;
            }
            if conn.enqueue(Arc::clone(message)) {
                recipients += 1;
            } else if conn.is_open() {
                drops += 1;
            }
        });
        if drops > 0 {
            counter!(WS_QUEUE_DROPS_TOTAL).increment(drops);
            warn!(label, drops, "broadcast dropped messages on full queues");
        }
        counter!(WS_BROADCAST_RECIPIENTS_TOTAL).increment(recipients as u64);
        debug!(label, recipients, bytes = message.len(), "broadcast");
        recipients
    }

    /// Set an attribute on a live connection.
    pub fn set_attribute(
        &self,
        id: ConnectionId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let conn = self.live(id)?;
        conn.set_attribute(key, value);
        Ok(())
    }

    /// Read an attribute from a live connection. Unset keys read as `""`.
    pub fn get_attribute(&self, id: ConnectionId, key: &str) -> Result<String> {
        Ok(self.live(id)?.attribute(key))
    }

    /// Grant a permission tag. Returns `true` if newly granted.
    pub fn grant_permission(&self, id: ConnectionId, tag: &str) -> Result<bool> {
        Ok(self.live(id)?.grant_permission(tag))
    }

    /// Revoke a permission tag. Returns `true` if it was held.
    pub fn revoke_permission(&self, id: ConnectionId, tag: &str) -> Result<bool> {
        Ok(self.live(id)?.revoke_permission(tag))
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    fn live(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        self.registry
            .get(id)
            .ok_or(MuxError::UnknownConnection(id))
    }
}
