//! Logging initialization.
//!
//! Verbosity keeps the numeric scale operators already use on the command
//! line and in settings files:
//!
//! | Value | Level |
//! |-------|-------|
//! | 0 | off |
//! | 1 | trace |
//! | 2 | debug |
//! | 3 | info |
//! | 4, 5 | warn |
//! | 6 | error |
//!
//! Anything else maps to trace. `RUST_LOG`, when set, overrides the
//! configured level for the stdout layer.

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Logging verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum LogLevel {
    /// Logging disabled.
    Off,
    /// Everything.
    Trace,
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warnings and errors.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Map a numeric verbosity to a level.
    pub fn from_verbosity(value: u8) -> Self {
        match value {
            0 => Self::Off,
            2 => Self::Debug,
            3 => Self::Info,
            4 | 5 => Self::Warn,
            6 => Self::Error,
            _ => Self::Trace,
        }
    }

    /// Canonical numeric verbosity for this level.
    pub fn verbosity(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Trace => 1,
            Self::Debug => 2,
            Self::Info => 3,
            Self::Warn => 4,
            Self::Error => 6,
        }
    }

    /// `EnvFilter` directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Per-layer filter for this level.
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

impl From<u8> for LogLevel {
    fn from(value: u8) -> Self {
        Self::from_verbosity(value)
    }
}

impl From<LogLevel> for u8 {
    fn from(level: LogLevel) -> Self {
        level.verbosity()
    }
}

/// Stdout logging configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogConfig {
    /// Default level, overridden by `RUST_LOG`.
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

/// Additional layer installed next to the stdout layer (e.g. a log forwarder).
pub type ExtraLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber. Call once at startup.
///
/// `extra` receives every event that passes its own filter, independent of
/// the stdout filter.
pub fn init_logging(config: &LogConfig, extra: Option<ExtraLayer>) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(extra)
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
}
