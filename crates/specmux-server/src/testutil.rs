//! Scripted engine and recording handler for tests.
//!
//! Enabled for this crate's own tests and, through the `testutil` feature,
//! for downstream crates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use specmux_core::ConnectionId;

use crate::engine::{Engine, EngineEvent};
use crate::errors::EngineError;
use crate::websocket::handler::Handler;

/// In-memory [`Engine`] that replays scripted event batches.
///
/// Each `poll` call delivers the next scripted batch (or nothing). Sends are
/// recorded in order; individual connections can be made to short-write or
/// fail outright.
#[derive(Debug, Default)]
pub struct MockEngine {
    script: VecDeque<Vec<EngineEvent>>,
    poll_failure: Option<String>,
    short_writes: HashMap<ConnectionId, usize>,
    failing_sends: HashSet<ConnectionId>,
    sent: Vec<(ConnectionId, String)>,
    writable_requests: Vec<ConnectionId>,
    closed: Vec<ConnectionId>,
    polls: usize,
}

impl MockEngine {
    /// Create an engine with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one batch of events for a future `poll`.
    pub fn script(&mut self, events: impl IntoIterator<Item = EngineEvent>) {
        self.script.push_back(events.into_iter().collect());
    }

    /// Make the next `poll` fail.
    pub fn fail_next_poll(&mut self, reason: &str) {
        self.poll_failure = Some(reason.to_string());
    }

    /// Sends to `id` accept at most `accepted` bytes from now on.
    pub fn short_write(&mut self, id: ConnectionId, accepted: usize) {
        let _ = self.short_writes.insert(id, accepted);
    }

    /// Sends to `id` return an error from now on.
    pub fn fail_sends(&mut self, id: ConnectionId) {
        let _ = self.failing_sends.insert(id);
    }

    /// Every fully accepted send, in order.
    pub fn sent(&self) -> &[(ConnectionId, String)] {
        &self.sent
    }

    /// Fully accepted sends to one connection, in order.
    pub fn sent_to(&self, id: ConnectionId) -> Vec<String> {
        self.sent
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Every writability request, in order.
    pub fn writable_requests(&self) -> &[ConnectionId] {
        &self.writable_requests
    }

    /// Connections closed through [`Engine::close`].
    pub fn closed(&self) -> &[ConnectionId] {
        &self.closed
    }

    /// Number of `poll` calls so far.
    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl Engine for MockEngine {
    fn poll(
        &mut self,
        _timeout: Option<Duration>,
        events: &mut Vec<EngineEvent>,
    ) -> Result<(), EngineError> {
        self.polls += 1;
        if let Some(reason) = self.poll_failure.take() {
            return Err(EngineError::Protocol(reason));
        }
        if let Some(batch) = self.script.pop_front() {
            events.extend(batch);
        }
        Ok(())
    }

    fn try_send(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<usize, EngineError> {
        if self.failing_sends.contains(&id) {
            return Err(EngineError::Protocol("connection reset".into()));
        }
        if let Some(&accepted) = self.short_writes.get(&id) {
            if accepted < bytes.len() {
                return Ok(accepted);
            }
        }
        self.sent
            .push((id, String::from_utf8_lossy(bytes).into_owned()));
        Ok(bytes.len())
    }

    fn request_writable(&mut self, id: ConnectionId) {
        self.writable_requests.push(id);
    }

    fn close(&mut self, id: ConnectionId) {
        self.closed.push(id);
    }
}

/// One handler callback, as observed by [`RecordingHandler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerCall {
    /// `on_connect`
    Connect(ConnectionId),
    /// `on_disconnect`
    Disconnect(ConnectionId),
    /// `on_message`
    Message(ConnectionId, String),
    /// `on_error`
    Error(ConnectionId, String),
}

/// [`Handler`] that records every callback.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    /// Calls in the order they happened.
    pub calls: Vec<HandlerCall>,
}

impl Handler for RecordingHandler {
    fn on_connect(&mut self, id: ConnectionId) {
        self.calls.push(HandlerCall::Connect(id));
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        self.calls.push(HandlerCall::Disconnect(id));
    }

    fn on_message(&mut self, id: ConnectionId, text: &str) {
        self.calls.push(HandlerCall::Message(id, text.to_string()));
    }

    fn on_error(&mut self, id: ConnectionId, reason: &str) {
        self.calls.push(HandlerCall::Error(id, reason.to_string()));
    }
}
