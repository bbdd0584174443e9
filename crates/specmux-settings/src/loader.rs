//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SpecmuxSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. [`SpecmuxSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use specmux_core::LogLevel;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::SpecmuxSettings;

/// Resolve the default settings file path (`~/.specmux/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".specmux").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SpecmuxSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Malformed JSON is
/// [`SettingsError::Json`]; well-formed JSON whose values do not fit the
/// schema (a string port, a negative size) is [`SettingsError::InvalidValue`].
pub fn load_settings_from_path(path: &Path) -> Result<SpecmuxSettings> {
    let defaults = serde_json::to_value(SpecmuxSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SpecmuxSettings = serde_json::from_value(merged)
        .map_err(|e| SettingsError::InvalidValue(e.to_string()))?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut SpecmuxSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SPECMUX_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("SPECMUX_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_u64("SPECMUX_POLL_TIMEOUT_MS", 1, 60_000) {
        settings.server.poll_timeout_ms = v;
    }
    if let Some(v) = read_env_u16("SPECMUX_METRICS_PORT", 1, 65535) {
        settings.server.metrics_port = Some(v);
    }

    // ── Spectrum ────────────────────────────────────────────────────
    if let Some(v) = read_env_usize("SPECMUX_FFT_SIZE", 16, 65_536) {
        settings.spectrum.fft_size = v;
    }
    if let Some(v) = read_env_f64("SPECMUX_CENTER_FREQ") {
        settings.spectrum.center_frequency = v;
    }
    if let Some(v) = read_env_f64("SPECMUX_SPAN") {
        settings.spectrum.span = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("SPECMUX_LOG_LEVEL", 0, 255) {
        settings.logging.level = LogLevel::from_verbosity(v as u8);
    }
    if let Some(v) = read_env_bool("SPECMUX_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64`.
pub fn parse_finite_f64(val: &str) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    n.is_finite().then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_f64(name: &str) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let result = parse_finite_f64(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid float env var, ignoring");
    }
    result
}
