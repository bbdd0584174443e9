//! # specmux-settings
//!
//! Configuration management with layered sources for the specmux server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`SpecmuxSettings::default()`]
//! 2. **Settings file** — `~/.specmux/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables** — `SPECMUX_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use specmux_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("WebSocket port: {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
