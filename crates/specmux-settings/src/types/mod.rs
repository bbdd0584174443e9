//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Each type implements [`Default`] with production default values,
//! and `#[serde(default)]` allows partial JSON.

mod server;
mod spectrum;

pub use server::*;
pub use spectrum::*;

use serde::{Deserialize, Serialize};

/// Transform size used when the configured one is unusable.
pub const FALLBACK_FFT_SIZE: usize = 512;

/// Root settings type.
///
/// Example file:
///
/// ```json
/// {
///   "server": { "port": 9002 },
///   "spectrum": { "centerFrequency": 433920000, "span": 1000000 },
///   "logging": { "level": 2 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecmuxSettings {
    /// Socket server settings.
    pub server: ServerSettings,
    /// Spectrum producer settings.
    pub spectrum: SpectrumSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl SpecmuxSettings {
    /// Correct invalid values in place.
    ///
    /// Called automatically during loading. Bad values are replaced with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        let sp = &mut self.spectrum;
        if sp.fft_size < 16 || !sp.fft_size.is_power_of_two() {
            tracing::warn!(
                fft_size = sp.fft_size,
                fallback = FALLBACK_FFT_SIZE,
                "fft size must be a power of two >= 16"
            );
            sp.fft_size = FALLBACK_FFT_SIZE;
        }
        if sp.queue_capacity == 0 {
            tracing::warn!("queue capacity 0 is unusable, using 1");
            sp.queue_capacity = 1;
        }
        if !sp.span.is_finite() || sp.span <= 0.0 {
            let fallback = SpectrumSettings::default().span;
            tracing::warn!(span = sp.span, fallback, "span must be positive");
            sp.span = fallback;
        }
        if !sp.center_frequency.is_finite() {
            let fallback = SpectrumSettings::default().center_frequency;
            tracing::warn!(fallback, "center frequency must be finite");
            sp.center_frequency = fallback;
        }
        if sp.source.batch_size == 0 {
            tracing::warn!(fft_size = sp.fft_size, "source batch size 0, using fft size");
            sp.source.batch_size = sp.fft_size;
        }
        if self.server.poll_timeout_ms == 0 {
            tracing::warn!("poll timeout 0 would spin the reactor, using 1ms");
            self.server.poll_timeout_ms = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut settings = SpecmuxSettings::default();
        let before = serde_json::to_value(&settings).unwrap();
        settings.validate();
        assert_eq!(serde_json::to_value(&settings).unwrap(), before);
    }

    #[test]
    fn default_values() {
        let s = SpecmuxSettings::default();
        assert_eq!(s.server.port, 9002);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.max_queue_depth, 0);
        assert_eq!(s.spectrum.fft_size, 512);
        assert_eq!(s.spectrum.backpressure_threshold, 5);
        assert!(s.spectrum.permission.is_none());
        assert_eq!(s.logging.websocket_permission, "logs");
    }

    #[test]
    fn non_power_of_two_fft_size_falls_back() {
        let mut s = SpecmuxSettings::default();
        s.spectrum.fft_size = 500;
        s.validate();
        assert_eq!(s.spectrum.fft_size, FALLBACK_FFT_SIZE);
    }

    #[test]
    fn tiny_fft_size_falls_back() {
        let mut s = SpecmuxSettings::default();
        s.spectrum.fft_size = 8;
        s.validate();
        assert_eq!(s.spectrum.fft_size, FALLBACK_FFT_SIZE);
    }

    #[test]
    fn larger_power_of_two_is_kept() {
        let mut s = SpecmuxSettings::default();
        s.spectrum.fft_size = 2048;
        s.validate();
        assert_eq!(s.spectrum.fft_size, 2048);
    }

    #[test]
    fn zero_queue_capacity_corrected() {
        let mut s = SpecmuxSettings::default();
        s.spectrum.queue_capacity = 0;
        s.validate();
        assert_eq!(s.spectrum.queue_capacity, 1);
    }

    #[test]
    fn negative_span_corrected() {
        let mut s = SpecmuxSettings::default();
        s.spectrum.span = -1.0;
        s.validate();
        assert!(s.spectrum.span > 0.0);
    }

    #[test]
    fn zero_poll_timeout_corrected() {
        let mut s = SpecmuxSettings::default();
        s.server.poll_timeout_ms = 0;
        s.validate();
        assert_eq!(s.server.poll_timeout_ms, 1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: SpecmuxSettings =
            serde_json::from_str(r#"{"server": {"port": 7000}}"#).unwrap();
        assert_eq!(s.server.port, 7000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.spectrum.fft_size, 512);
    }

    #[test]
    fn camel_case_keys() {
        let value = serde_json::to_value(SpecmuxSettings::default()).unwrap();
        assert!(value["server"].get("pollTimeoutMs").is_some());
        assert!(value["spectrum"].get("backpressureThreshold").is_some());
        assert!(value["logging"].get("websocketSink").is_some());
    }
}
