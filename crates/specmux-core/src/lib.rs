//! # specmux-core
//!
//! Foundation types and logging setup for the specmux server.
//!
//! - **Connection IDs**: [`ids::ConnectionId`], the engine-assigned key for a live connection
//! - **Logging**: [`logging::LogLevel`] numeric verbosity and [`logging::init_logging`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other specmux crates.

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::ConnectionId;
pub use logging::{LogConfig, LogLevel, init_logging};
