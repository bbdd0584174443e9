//! Application callbacks invoked by the multiplexer.

use specmux_core::ConnectionId;

/// Lifecycle and message callbacks.
///
/// Called on the reactor thread only, once per corresponding engine event.
/// Callbacks must not block: anything slow belongs on a producer thread
/// that talks back through a [`BroadcastRouter`](crate::BroadcastRouter).
pub trait Handler: Send {
    /// A connection was established and registered.
    fn on_connect(&mut self, _id: ConnectionId) {}

    /// The peer closed the connection. The connection is still registered
    /// during this call and removed right after.
    fn on_disconnect(&mut self, _id: ConnectionId) {}

    /// A text payload arrived.
    fn on_message(&mut self, _id: ConnectionId, _text: &str) {}

    /// A send failed and the connection is being torn down. No
    /// `on_disconnect` follows.
    fn on_error(&mut self, _id: ConnectionId, _reason: &str) {}
}

/// Handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl Handler for NoopHandler {}
