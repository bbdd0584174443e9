//! Spectrum producer and sample source settings.

use serde::{Deserialize, Serialize};

/// Spectrum producer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpectrumSettings {
    /// Transform size N (number of power values per message).
    pub fft_size: usize,
    /// Queued batches required before a batch is processed.
    pub backpressure_threshold: usize,
    /// How long the producer waits for new samples per iteration.
    pub wait_timeout_ms: u64,
    /// Maximum batches held by the sample queue.
    pub queue_capacity: usize,
    /// Center frequency reported in each message, in Hz.
    pub center_frequency: f64,
    /// Span reported in each message, in Hz.
    pub span: f64,
    /// Only send spectra to connections holding this permission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    /// Synthetic sample source.
    pub source: SourceSettings,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            fft_size: 512,
            backpressure_threshold: 5,
            wait_timeout_ms: 100,
            queue_capacity: 64,
            center_frequency: 145_000_000.0,
            span: 2_000_000.0,
            permission: None,
            source: SourceSettings::default(),
        }
    }
}

/// Synthetic sweep source settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSettings {
    /// Run the built-in sweep generator.
    pub enabled: bool,
    /// Complex samples per batch.
    pub batch_size: usize,
    /// Delay between batches in milliseconds.
    pub batch_interval_ms: u64,
    /// Time for one full sweep across the span, in milliseconds.
    pub sweep_period_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 2048,
            batch_interval_ms: 10,
            sweep_period_ms: 4000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_omitted_when_none() {
        let value = serde_json::to_value(SpectrumSettings::default()).unwrap();
        assert!(value.get("permission").is_none());
    }

    #[test]
    fn permission_parsed() {
        let s: SpectrumSettings = serde_json::from_str(r#"{"permission": "spectrum"}"#).unwrap();
        assert_eq!(s.permission.as_deref(), Some("spectrum"));
        assert_eq!(s.fft_size, 512);
    }

    #[test]
    fn source_defaults() {
        let s = SourceSettings::default();
        assert!(s.enabled);
        assert_eq!(s.batch_size, 2048);
    }
}
