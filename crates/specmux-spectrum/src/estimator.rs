//! Power spectral density estimation.
//!
//! [`WelchEstimator`] averages periodograms of overlapping Hann-windowed
//! segments. Segments are `N/2` samples long, advance by `N/4`, and are
//! zero-padded to the transform size `N`. The output is `N` values in dB,
//! DC-centred: index 0 is the most negative frequency, index `N/2` is DC.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::errors::{Result, SpectrumError};

/// Floor added before taking the logarithm so silence stays finite.
const POWER_FLOOR: f32 = 1e-20;

/// Pure function from a batch of samples to `fft_size()` power values.
pub trait PowerSpectrumEstimator: Send {
    /// Number of power values produced per estimate.
    fn fft_size(&self) -> usize;

    /// Estimate the power spectrum of `samples`, in dB, DC-centred.
    fn estimate(&mut self, samples: &[Complex32]) -> Result<Vec<f32>>;
}

/// Welch-averaged periodogram backed by `rustfft`.
pub struct WelchEstimator {
    nfft: usize,
    hop: usize,
    window: Vec<f32>,
    /// Sum of squared window coefficients.
    window_power: f32,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
    accum: Vec<f32>,
}

impl WelchEstimator {
    /// Plan an estimator for transform size `nfft` (at least 4).
    pub fn new(nfft: usize) -> Result<Self> {
        if nfft < 4 {
            return Err(SpectrumError::InvalidTransformSize(nfft));
        }
        let window = hann_window(nfft / 2);
        let window_power: f32 = window.iter().map(|w| w * w).sum();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(nfft);
        let scratch = vec![Complex32::default(); fft.get_inplace_scratch_len()];
        Ok(Self {
            nfft,
            hop: (nfft / 4).max(1),
            window,
            window_power,
            fft,
            buffer: vec![Complex32::default(); nfft],
            scratch,
            accum: vec![0.0; nfft],
        })
    }

    /// Samples per analysis segment.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

impl PowerSpectrumEstimator for WelchEstimator {
    fn fft_size(&self) -> usize {
        self.nfft
    }

    fn estimate(&mut self, samples: &[Complex32]) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Err(SpectrumError::EmptyBatch);
        }
        let window_len = self.window.len();
        if samples.len() < window_len {
            return Err(SpectrumError::InsufficientSamples {
                needed: window_len,
                got: samples.len(),
            });
        }

        self.accum.fill(0.0);
        let mut segments = 0usize;
        let mut start = 0usize;
        while start + window_len <= samples.len() {
            self.buffer.fill(Complex32::default());
            for ((dst, &s), &w) in self
                .buffer
                .iter_mut()
                .zip(&samples[start..start + window_len])
                .zip(&self.window)
            {
                *dst = s * w;
            }
            self.fft
                .process_with_scratch(&mut self.buffer, &mut self.scratch);
            for (acc, bin) in self.accum.iter_mut().zip(&self.buffer) {
                *acc += bin.norm_sqr();
            }
            segments += 1;
            start += self.hop;
        }

        let scale = 1.0 / (segments as f32 * self.window_power);
        let half = self.nfft / 2;
        let psd = (0..self.nfft)
            .map(|k| {
                let power = self.accum[(k + half) % self.nfft] * scale;
                10.0 * (power + POWER_FLOOR).log10()
            })
            .collect();
        Ok(psd)
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - ((2.0 * PI * i as f32) / (size - 1) as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tone(bin: f32, nfft: usize, len: usize) -> Vec<Complex32> {
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * bin * n as f32 / nfft as f32;
                Complex32::new(phase.cos(), phase.sin())
            })
            .collect()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_hann_window() {
        let window = hann_window(4);
        assert_eq!(window.len(), 4);
        assert!(window[0] < 0.1);
        assert!(window[1] > 0.7 && window[1] < 0.8);
    }

    #[test]
    fn output_has_transform_size_values() {
        let mut est = WelchEstimator::new(512).unwrap();
        let psd = est.estimate(&tone(10.0, 512, 2048)).unwrap();
        assert_eq!(psd.len(), 512);
        assert_eq!(est.fft_size(), 512);
        assert_eq!(est.window_len(), 256);
    }

    #[test]
    fn positive_tone_lands_right_of_center() {
        let mut est = WelchEstimator::new(64).unwrap();
        let psd = est.estimate(&tone(5.0, 64, 256)).unwrap();
        assert_eq!(argmax(&psd), 32 + 5);
    }

    #[test]
    fn negative_tone_lands_left_of_center() {
        let mut est = WelchEstimator::new(64).unwrap();
        let psd = est.estimate(&tone(-8.0, 64, 256)).unwrap();
        assert_eq!(argmax(&psd), 32 - 8);
    }

    #[test]
    fn dc_lands_at_center() {
        let mut est = WelchEstimator::new(64).unwrap();
        let samples = vec![Complex32::new(1.0, 0.0); 128];
        let psd = est.estimate(&samples).unwrap();
        assert_eq!(argmax(&psd), 32);
    }

    #[test]
    fn silence_is_finite() {
        let mut est = WelchEstimator::new(32).unwrap();
        let psd = est.estimate(&vec![Complex32::default(); 64]).unwrap();
        assert!(psd.iter().all(|p| p.is_finite()));
        assert!(psd.iter().all(|&p| p < -150.0));
    }

    #[test]
    fn repeated_estimates_are_deterministic() {
        let mut est = WelchEstimator::new(64).unwrap();
        let samples = tone(3.0, 64, 200);
        let a = est.estimate(&samples).unwrap();
        let b = est.estimate(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exactly_one_window_is_enough() {
        let mut est = WelchEstimator::new(64).unwrap();
        assert!(est.estimate(&tone(1.0, 64, 32)).is_ok());
    }

    #[test]
    fn empty_batch_rejected() {
        let mut est = WelchEstimator::new(64).unwrap();
        assert_matches!(est.estimate(&[]), Err(SpectrumError::EmptyBatch));
    }

    #[test]
    fn short_batch_rejected() {
        let mut est = WelchEstimator::new(64).unwrap();
        assert_matches!(
            est.estimate(&tone(1.0, 64, 10)),
            Err(SpectrumError::InsufficientSamples { needed: 32, got: 10 })
        );
    }

    #[test]
    fn tiny_transform_size_rejected() {
        assert_eq!(
            WelchEstimator::new(2).err(),
            Some(SpectrumError::InvalidTransformSize(2))
        );
    }
}
