//! Synthetic sample source.
//!
//! Generates a unit-amplitude complex tone that sweeps linearly across the
//! whole band, `-fs/2` to `+fs/2`, and wraps. Lets the service run with no
//! radio attached.

use std::f64::consts::TAU;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustfft::num_complex::Complex32;
use specmux_settings::SourceSettings;
use tracing::{debug, info};

use crate::errors::SpectrumError;
use crate::queue::{SampleBatch, SampleQueue};

/// Sweeping tone generator feeding a [`SampleQueue`].
pub struct SweepSource {
    queue: Arc<SampleQueue>,
    batch_size: usize,
    interval: Duration,
    /// Change of normalized frequency per batch.
    step: f64,
    /// Normalized frequency in cycles per sample, in `[-0.5, 0.5)`.
    frequency: f64,
    /// Radians, kept in `[0, TAU)`.
    phase: f64,
}

impl SweepSource {
    /// Create a source starting at the lowest frequency.
    pub fn new(queue: Arc<SampleQueue>, settings: &SourceSettings) -> Self {
        let period = settings.sweep_period_ms.max(1) as f64;
        let step = (settings.batch_interval_ms as f64 / period).min(1.0);
        Self {
            queue,
            batch_size: settings.batch_size.max(1),
            interval: Duration::from_millis(settings.batch_interval_ms),
            step,
            frequency: -0.5,
            phase: 0.0,
        }
    }

    /// Current normalized frequency.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Produce the next batch and advance the sweep.
    pub fn next_batch(&mut self) -> SampleBatch {
        let increment = TAU * self.frequency;
        let samples = (0..self.batch_size)
            .map(|_| {
                let sample = Complex32::new(self.phase.cos() as f32, self.phase.sin() as f32);
                self.phase = (self.phase + increment).rem_euclid(TAU);
                sample
            })
            .collect();
        self.frequency += self.step;
        if self.frequency >= 0.5 {
            self.frequency -= 1.0;
        }
        SampleBatch::new(samples)
    }

    /// Push batches until `stop` is set. A full queue drops the batch.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            batch_size = self.batch_size,
            interval_ms = self.interval.as_millis() as u64,
            "sweep source running"
        );
        while !stop.load(Ordering::Acquire) {
            let batch = self.next_batch();
            if let Err(SpectrumError::QueueFull) = self.queue.try_push(batch) {
                debug!(capacity = self.queue.capacity(), "sample queue full, batch dropped");
            }
            thread::sleep(self.interval);
        }
        info!("sweep source stopped");
    }

    /// Run on a dedicated thread.
    pub fn spawn(mut self, stop: Arc<AtomicBool>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("sweep-source".into())
            .spawn(move || self.run(&stop))
    }
}
