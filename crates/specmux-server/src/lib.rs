//! # specmux-server
//!
//! Broadcast-oriented connection multiplexer.
//!
//! - **Registry**: [`websocket::registry::ConnectionRegistry`] owns the live connections
//! - **Connection**: [`websocket::connection::Connection`] holds the outbound queue, attributes, and permissions
//! - **Multiplexer**: [`websocket::multiplexer::Multiplexer`] drives an [`engine::Engine`] and drains queues on writability
//! - **Router**: [`websocket::broadcast::BroadcastRouter`] is the thread-safe send/broadcast handle given to producers
//! - **Engine**: [`engine::ws::WsEngine`] is the non-blocking WebSocket engine used in production
//! - **Log sink**: [`log_sink::WebSocketLogLayer`] forwards log lines to permitted connections
//!
//! ## Threading
//!
//! The multiplexer runs on one reactor thread and is the only code that
//! writes to sockets. Producers hold a cloned [`BroadcastRouter`] and only
//! append to in-memory queues.
//!
//! ## Crate Position
//!
//! Depends on: specmux-core.
//! Depended on by: specmux-spectrum, specmux.

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod log_sink;
pub mod metrics;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod websocket;

pub use engine::{Engine, EngineEvent};
pub use errors::{EngineError, MuxError, Result};
pub use websocket::broadcast::BroadcastRouter;
pub use websocket::connection::{Connection, ConnectionState};
pub use websocket::handler::{Handler, NoopHandler};
pub use websocket::multiplexer::Multiplexer;
pub use websocket::registry::ConnectionRegistry;
