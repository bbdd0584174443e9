//! Connection state, fan-out, and the reactor adapter.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-connection outbound queue, attributes, permissions |
//! | `registry` | Live connection map keyed by engine id |
//! | `broadcast` | Targeted send and filtered fan-out for producer threads |
//! | `handler` | Application callbacks invoked on the reactor thread |
//! | `multiplexer` | Engine event dispatch and the drain loop |
//!
//! ## Data Flow
//!
//! engine → `multiplexer` → `handler`.
//! producer → `broadcast` → `connection` queue → `multiplexer` drain → engine.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod multiplexer;
pub mod registry;
