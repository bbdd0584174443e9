//! Multiplexer and engine error types.

use specmux_core::ConnectionId;
use thiserror::Error;

/// Errors surfaced by the multiplexer and its registry.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The engine could not be initialized (bind, listener setup).
    #[error("startup failed: {0}")]
    Startup(String),
    /// A send to one connection failed; only that connection is closed.
    #[error("write to connection {id} failed: {reason}")]
    ConnectionWrite {
        /// Connection that failed.
        id: ConnectionId,
        /// Human-readable cause.
        reason: String,
    },
    /// No live connection has this id.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
    /// A live connection already has this id.
    #[error("duplicate connection: {0}")]
    DuplicateConnection(ConnectionId),
    /// The engine's readiness wait failed. The reactor cannot continue.
    #[error("poll failed: {0}")]
    Poll(String),
}

/// Result type for multiplexer operations.
pub type Result<T> = std::result::Result<T, MuxError>;

/// Errors reported by an [`Engine`](crate::engine::Engine) implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Socket-level I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// WebSocket upgrade failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// Framing or protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The engine has no socket for this id.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

impl From<EngineError> for MuxError {
    fn from(err: EngineError) -> Self {
        Self::Poll(err.to_string())
    }
}
