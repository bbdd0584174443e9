//! Reactor adapter: engine events in, handler callbacks and socket writes out.
//!
//! The multiplexer is owned by exactly one thread. It pulls events from the
//! [`Engine`], keeps the [`ConnectionRegistry`] in step with the engine's
//! view of the world, and drains outbound queues when the engine reports a
//! connection as writable.
//!
//! ## Drain loop
//!
//! On writability the head of the queue is peeked and handed to
//! [`Engine::try_send`]. Only a complete send pops it. A short write or a
//! send error closes that connection immediately, before anything else is
//! popped, so queued messages are never silently skipped. After a clean
//! drain a new writability notification is requested so messages enqueued
//! later by producer threads are flushed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use specmux_core::ConnectionId;
use tracing::{debug, error, info, trace, warn};

use super::broadcast::BroadcastRouter;
use super::connection::{Connection, ConnectionState};
use super::handler::Handler;
use super::registry::ConnectionRegistry;
use crate::engine::{Engine, EngineEvent};
use crate::errors::{MuxError, Result};
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_MESSAGES_SENT_TOTAL,
    WS_WRITE_FAILURES_TOTAL,
};

/// Single-threaded connection multiplexer.
pub struct Multiplexer<E: Engine, H: Handler> {
    engine: E,
    handler: H,
    router: BroadcastRouter,
    /// Reused between polls.
    events: Vec<EngineEvent>,
}

impl<E: Engine, H: Handler> Multiplexer<E, H> {
    /// Create a multiplexer with a fresh registry.
    pub fn new(engine: E, handler: H) -> Self {
        Self::with_router(
            engine,
            handler,
            BroadcastRouter::new(Arc::new(ConnectionRegistry::new())),
        )
    }

    /// Create a multiplexer sharing `router` with producers.
    pub fn with_router(engine: E, handler: H, router: BroadcastRouter) -> Self {
        Self {
            engine,
            handler,
            router,
            events: Vec::new(),
        }
    }

    /// Router handle; clone it to give producers access.
    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Queue `text` for one connection. No-op if it is gone.
    pub fn send(&self, id: ConnectionId, text: impl Into<Arc<str>>) -> bool {
        self.router.send_to(id, text)
    }

    /// Queue `text` for every connection.
    pub fn broadcast(&self, text: impl Into<Arc<str>>) -> usize {
        self.router.broadcast(text)
    }

    /// Queue `text` for every connection holding `tag`.
    pub fn broadcast_to_permission(&self, text: impl Into<Arc<str>>, tag: &str) -> usize {
        self.router.broadcast_to_permission(text, tag)
    }

    /// Set a connection attribute.
    pub fn set_attribute(
        &self,
        id: ConnectionId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.router.set_attribute(id, key, value)
    }

    /// Read a connection attribute; unset keys read as `""`.
    pub fn get_attribute(&self, id: ConnectionId, key: &str) -> Result<String> {
        self.router.get_attribute(id, key)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.router.connection_count()
    }

    /// Poll the engine once and dispatch everything it reported.
    ///
    /// Returns the number of events handled. An engine failure is returned
    /// as [`MuxError::Poll`]; the reactor should stop.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let mut events = std::mem::take(&mut self.events);
        events.clear();
        if let Err(err) = self.engine.poll(timeout, &mut events) {
            self.events = events;
            error!(error = %err, "engine poll failed");
            return Err(err.into());
        }
        let handled = events.len();
        for event in events.drain(..) {
            self.dispatch(event);
        }
        self.events = events;
        Ok(handled)
    }

    /// Poll forever. Returns only on a poll failure.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<()> {
        info!(?timeout, "multiplexer running");
        loop {
            let _ = self.poll_once(timeout)?;
        }
    }

    /// Poll until `stop` is set or the engine fails.
    pub fn run_until(&mut self, stop: &AtomicBool, timeout: Option<Duration>) -> Result<()> {
        info!(?timeout, "multiplexer running");
        while !stop.load(Ordering::Acquire) {
            let _ = self.poll_once(timeout)?;
        }
        info!("multiplexer stopped");
        Ok(())
    }

    /// Apply one engine event.
    pub fn dispatch(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Established(id) => self.on_established(id),
            EngineEvent::Writable(id) => self.on_writable(id),
            EngineEvent::Receive(id, bytes) => self.on_receive(id, &bytes),
            EngineEvent::Closed(id) => self.on_closed(id),
        }
    }

    fn on_established(&mut self, id: ConnectionId) {
        let conn = match self.router.registry().register(id) {
            Ok(conn) => conn,
            Err(err) => {
                warn!(conn_id = %id, error = %err, "ignoring established event");
                return;
            }
        };
        conn.set_state(ConnectionState::Established);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        self.update_active_gauge();
        info!(conn_id = %id, "connection established");
        self.handler.on_connect(id);
        self.engine.request_writable(id);
    }

    fn on_writable(&mut self, id: ConnectionId) {
        let Some(conn) = self.router.registry().get(id) else {
            return;
        };
        if conn.state() != ConnectionState::Established {
            return;
        }
        self.drain(&conn);
    }

    fn on_receive(&mut self, id: ConnectionId, bytes: &[u8]) {
        if !self.router.registry().contains(id) {
            trace!(conn_id = %id, "payload for unknown connection ignored");
            return;
        }
        let text = String::from_utf8_lossy(bytes);
        debug!(conn_id = %id, len = bytes.len(), "message received");
        self.handler.on_message(id, &text);
    }

    fn on_closed(&mut self, id: ConnectionId) {
        let Some(conn) = self.router.registry().get(id) else {
            return;
        };
        self.handler.on_disconnect(id);
        let _ = self.router.registry().unregister(id);
        let pending = conn.clear_queue();
        conn.set_state(ConnectionState::Closed);
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        self.update_active_gauge();
        info!(conn_id = %id, pending, "connection closed");
    }

    fn drain(&mut self, conn: &Connection) {
        let id = conn.id;
        let mut sent = 0u64;
        while let Some(message) = conn.front() {
            let result = self.engine.try_send(id, message.as_bytes());
            match result {
                Ok(n) if n == message.len() => {
                    let _ = conn.drain_ready();
                    sent += 1;
                }
                Ok(n) => {
                    counter!(WS_MESSAGES_SENT_TOTAL).increment(sent);
                    let reason = format!("partial write: {n} of {} bytes", message.len());
                    self.fail_connection(conn, reason);
                    return;
                }
                Err(err) => {
                    counter!(WS_MESSAGES_SENT_TOTAL).increment(sent);
                    self.fail_connection(conn, err.to_string());
                    return;
                }
            }
        }
        if sent > 0 {
            counter!(WS_MESSAGES_SENT_TOTAL).increment(sent);
            trace!(conn_id = %id, sent, "drained");
        }
        self.engine.request_writable(id);
    }

    /// Tear down a connection whose send failed. Only `conn` is affected.
    fn fail_connection(&mut self, conn: &Connection, reason: String) {
        let id = conn.id;
        conn.set_state(ConnectionState::Closing);
        let err = MuxError::ConnectionWrite { id, reason };
        let discarded = conn.clear_queue();
        warn!(conn_id = %id, error = %err, discarded, "closing connection after failed write");
        counter!(WS_WRITE_FAILURES_TOTAL).increment(1);
        self.handler.on_error(id, &err.to_string());
        let _ = self.router.registry().unregister(id);
        conn.set_state(ConnectionState::Closed);
        self.engine.close(id);
        self.update_active_gauge();
    }

    fn update_active_gauge(&self) {
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.router.connection_count() as f64);
    }
}
