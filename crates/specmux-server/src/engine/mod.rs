//! Socket engine contract consumed by the multiplexer.
//!
//! An engine owns the sockets: accept, upgrade, framing, and readiness. It
//! reports what happened through [`EngineEvent`]s collected by
//! [`Engine::poll`], and exposes a non-blocking send primitive. The
//! multiplexer never touches sockets directly.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ws` | Non-blocking WebSocket engine over `tungstenite` |

pub mod ws;

use std::time::Duration;

use specmux_core::ConnectionId;

use crate::errors::EngineError;

/// Readiness and lifecycle notifications from an engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new connection completed its handshake.
    Established(ConnectionId),
    /// A connection that requested it can accept more data.
    Writable(ConnectionId),
    /// A payload arrived.
    Receive(ConnectionId, Vec<u8>),
    /// The peer closed, or the socket failed.
    Closed(ConnectionId),
}

impl EngineEvent {
    /// Connection the event refers to.
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Established(id)
            | Self::Writable(id)
            | Self::Receive(id, _)
            | Self::Closed(id) => *id,
        }
    }
}

/// Socket engine driven by the multiplexer's reactor thread.
pub trait Engine {
    /// Wait up to `timeout` (forever when `None`) and append every pending
    /// event to `events`. An error means the engine cannot continue.
    fn poll(
        &mut self,
        timeout: Option<Duration>,
        events: &mut Vec<EngineEvent>,
    ) -> Result<(), EngineError>;

    /// Hand `bytes` to the transport without blocking. Returns how many
    /// bytes were accepted; anything short of `bytes.len()` is a partial
    /// write.
    fn try_send(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<usize, EngineError>;

    /// Ask for a [`EngineEvent::Writable`] notification for `id`.
    fn request_writable(&mut self, id: ConnectionId);

    /// Close `id` without emitting [`EngineEvent::Closed`].
    fn close(&mut self, id: ConnectionId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_for_every_variant() {
        let id = ConnectionId::new(4);
        for event in [
            EngineEvent::Established(id),
            EngineEvent::Writable(id),
            EngineEvent::Receive(id, b"x".to_vec()),
            EngineEvent::Closed(id),
        ] {
            assert_eq!(event.id(), id);
        }
    }
}
