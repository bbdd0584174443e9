//! Spectrogram producer loop.
//!
//! One producer runs on its own thread. Each iteration waits briefly for
//! new samples, then applies a depth gate: only when more than
//! `backpressure_threshold` batches are queued is exactly one batch popped,
//! estimated, encoded, and queued for clients. The estimator only runs
//! while at least one client is attached.
//!
//! The loop never writes to sockets. It enqueues through a
//! [`BroadcastRouter`] and the reactor flushes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use specmux_server::BroadcastRouter;
use specmux_server::metrics::{
    SPECTRUM_BATCHES_SKIPPED_TOTAL, SPECTRUM_ESTIMATOR_FAILURES_TOTAL, SPECTRUM_PUBLISHED_TOTAL,
};
use specmux_settings::SpectrumSettings;
use tracing::{debug, info, trace, warn};

use crate::estimator::PowerSpectrumEstimator;
use crate::gate::ClientGate;
use crate::message::encode_spectrum;
use crate::queue::SampleQueue;

/// Producer lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ProducerState {
    /// Constructed, `run` not yet called.
    Idle = 0,
    /// Inside `run`.
    Running = 1,
    /// `terminate` called, loop finishing its iteration.
    Stopping = 2,
    /// `run` returned. Terminal.
    Stopped = 3,
}

impl ProducerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Metadata reported with every spectrum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning {
    /// Center frequency in Hz.
    pub center: f64,
    /// Span in Hz.
    pub span: f64,
}

impl From<&SpectrumSettings> for Tuning {
    fn from(settings: &SpectrumSettings) -> Self {
        Self {
            center: settings.center_frequency,
            span: settings.span,
        }
    }
}

/// Producer policy.
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    /// Batches that must be queued before one is processed.
    pub backpressure_threshold: usize,
    /// Upper bound on one wait for new samples.
    pub wait_timeout: Duration,
    /// Restrict spectra to connections holding this tag; `None` sends to all.
    pub permission: Option<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            backpressure_threshold: 5,
            wait_timeout: Duration::from_millis(100),
            permission: None,
        }
    }
}

impl From<&SpectrumSettings> for ProducerConfig {
    fn from(settings: &SpectrumSettings) -> Self {
        Self {
            backpressure_threshold: settings.backpressure_threshold,
            wait_timeout: Duration::from_millis(settings.wait_timeout_ms),
            permission: settings.permission.clone(),
        }
    }
}

/// Outcome of one producer iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Iteration {
    /// No sample queue is bound.
    NoQueue,
    /// Depth at or below the threshold; nothing popped.
    Skipped {
        /// Queue depth observed.
        depth: usize,
    },
    /// A batch was popped but no client is attached.
    Suppressed,
    /// The estimator failed; the batch was discarded.
    Failed,
    /// A spectrum was queued for `recipients` connections.
    Published {
        /// Connections that accepted the message.
        recipients: usize,
    },
}

/// Pulls sample batches, estimates spectra, and broadcasts them.
pub struct SpectrogramProducer {
    router: BroadcastRouter,
    gate: ClientGate,
    estimator: Mutex<Box<dyn PowerSpectrumEstimator>>,
    /// Separate from connection state; rebinding is rare.
    queue: Mutex<Option<Arc<SampleQueue>>>,
    tuning: Mutex<Tuning>,
    config: ProducerConfig,
    state: AtomicU8,
    stopping: AtomicBool,
}

impl SpectrogramProducer {
    /// Create an idle producer with no queue bound.
    pub fn new(
        router: BroadcastRouter,
        estimator: Box<dyn PowerSpectrumEstimator>,
        config: ProducerConfig,
        tuning: Tuning,
    ) -> Self {
        Self {
            router,
            gate: ClientGate::new(),
            estimator: Mutex::new(estimator),
            queue: Mutex::new(None),
            tuning: Mutex::new(tuning),
            config,
            state: AtomicU8::new(ProducerState::Idle as u8),
            stopping: AtomicBool::new(false),
        }
    }

    /// Bind a sample queue, returning the previous one.
    pub fn set_queue(&self, queue: Arc<SampleQueue>) -> Option<Arc<SampleQueue>> {
        self.queue.lock().replace(queue)
    }

    /// Currently bound sample queue.
    pub fn queue(&self) -> Option<Arc<SampleQueue>> {
        self.queue.lock().clone()
    }

    /// Unbind the sample queue, returning it.
    pub fn take_queue(&self) -> Option<Arc<SampleQueue>> {
        self.queue.lock().take()
    }

    /// Attached-client gate, driven by the connection handler.
    pub fn gate(&self) -> &ClientGate {
        &self.gate
    }

    /// Current center and span.
    pub fn tuning(&self) -> Tuning {
        *self.tuning.lock()
    }

    /// Replace center and span.
    pub fn set_tuning(&self, tuning: Tuning) {
        *self.tuning.lock() = tuning;
    }

    /// Change the reported center frequency.
    pub fn set_center(&self, center: f64) {
        self.tuning.lock().center = center;
    }

    /// Change the reported span.
    pub fn set_span(&self, span: f64) {
        self.tuning.lock().span = span;
    }

    /// Lifecycle state.
    pub fn state(&self) -> ProducerState {
        ProducerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether `terminate` has been called.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Ask the loop to exit. Observed within one iteration.
    pub fn terminate(&self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.state.compare_exchange(
            ProducerState::Running as u8,
            ProducerState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Run until [`terminate`](Self::terminate) is called.
    pub fn run(&self) {
        let _ = self.state.compare_exchange(
            ProducerState::Idle as u8,
            ProducerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        info!(
            threshold = self.config.backpressure_threshold,
            permission = self.config.permission.as_deref().unwrap_or("*"),
            "spectrogram producer running"
        );
        while !self.is_stopping() {
            self.wait_for_samples();
            if self.is_stopping() {
                break;
            }
            let _ = self.run_once();
        }
        self.state
            .store(ProducerState::Stopped as u8, Ordering::Release);
        info!("spectrogram producer stopped");
    }

    /// Bounded wait so the stop flag is re-checked promptly. Does not wait
    /// when a backlog is already above the threshold.
    fn wait_for_samples(&self) {
        match self.queue() {
            Some(queue) if queue.len() <= self.config.backpressure_threshold => {
                let _ = queue.wait_for_push(self.config.wait_timeout);
            }
            Some(_) => {}
            None => std::thread::sleep(self.config.wait_timeout),
        }
    }

    /// One depth-gated iteration. Never blocks.
    pub fn run_once(&self) -> Iteration {
        let Some(queue) = self.queue() else {
            return Iteration::NoQueue;
        };
        let depth = queue.len();
        if depth <= self.config.backpressure_threshold {
            counter!(SPECTRUM_BATCHES_SKIPPED_TOTAL).increment(1);
            trace!(depth, "below backpressure threshold");
            return Iteration::Skipped { depth };
        }
        let Some(batch) = queue.try_pop() else {
            return Iteration::Skipped { depth: 0 };
        };
        if !self.gate.is_open() {
            return Iteration::Suppressed;
        }

        let estimated = self.estimator.lock().estimate(&batch.samples);
        let powers = match estimated {
            Ok(powers) => powers,
            Err(err) => {
                counter!(SPECTRUM_ESTIMATOR_FAILURES_TOTAL).increment(1);
                warn!(error = %err, samples = batch.len(), "spectrum estimate failed");
                return Iteration::Failed;
            }
        };

        let tuning = self.tuning();
        let message = encode_spectrum(tuning.center, tuning.span, &powers);
        let recipients = match &self.config.permission {
            Some(tag) => self.router.broadcast_to_permission(message, tag),
            None => self.router.broadcast(message),
        };
        counter!(SPECTRUM_PUBLISHED_TOTAL).increment(1);
        debug!(recipients, depth, bins = powers.len(), "spectrum published");
        Iteration::Published { recipients }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{Result, SpectrumError};
    use crate::estimator::WelchEstimator;
    use crate::queue::SampleBatch;
    use rustfft::num_complex::Complex32;
    use specmux_core::ConnectionId;
    use specmux_server::ConnectionRegistry;

    /// Returns a fixed ramp, or fails when asked to.
    struct FixedEstimator {
        size: usize,
        fail: bool,
    }

    impl PowerSpectrumEstimator for FixedEstimator {
        fn fft_size(&self) -> usize {
            self.size
        }

        fn estimate(&mut self, _samples: &[Complex32]) -> Result<Vec<f32>> {
            if self.fail {
                return Err(SpectrumError::Estimator("boom".into()));
            }
            Ok((0..self.size).map(|i| -(i as f32) - 0.5).collect())
        }
    }

    fn router_with(n: u64) -> BroadcastRouter {
        let router = BroadcastRouter::new(Arc::new(ConnectionRegistry::new()));
        for i in 1..=n {
            let _ = router.registry().register(ConnectionId::new(i)).unwrap();
        }
        router
    }

    fn producer(
        router: BroadcastRouter,
        config: ProducerConfig,
        fail: bool,
    ) -> SpectrogramProducer {
        SpectrogramProducer::new(
            router,
            Box::new(FixedEstimator { size: 4, fail }),
            config,
            Tuning {
                center: 100.0,
                span: 10.0,
            },
        )
    }

    fn queue_with(batches: usize) -> Arc<SampleQueue> {
        let queue = Arc::new(SampleQueue::new(64));
        for _ in 0..batches {
            queue
                .try_push(SampleBatch::new(vec![Complex32::new(1.0, 0.0); 8]))
                .unwrap();
        }
        queue
    }

    fn drain(router: &BroadcastRouter, n: u64) -> Vec<String> {
        let conn = router.registry().get(ConnectionId::new(n)).unwrap();
        let mut out = Vec::new();
        while let Some(m) = conn.drain_ready() {
            out.push(m.to_string());
        }
        out
    }

    #[test]
    fn no_queue_bound() {
        let p = producer(router_with(0), ProducerConfig::default(), false);
        assert_eq!(p.run_once(), Iteration::NoQueue);
    }

    #[test]
    fn depth_at_threshold_skips_without_pop() {
        let router = router_with(1);
        let p = producer(router.clone(), ProducerConfig::default(), false);
        let _ = p.gate().attach();
        let queue = queue_with(5);
        let _ = p.set_queue(Arc::clone(&queue));

        assert_eq!(p.run_once(), Iteration::Skipped { depth: 5 });
        assert_eq!(queue.len(), 5);
        assert!(drain(&router, 1).is_empty());
    }

    #[test]
    fn depth_above_threshold_pops_exactly_one() {
        let router = router_with(1);
        let p = producer(router.clone(), ProducerConfig::default(), false);
        let _ = p.gate().attach();
        let queue = queue_with(6);
        let _ = p.set_queue(Arc::clone(&queue));

        assert_eq!(p.run_once(), Iteration::Published { recipients: 1 });
        assert_eq!(queue.len(), 5);
        assert_eq!(
            drain(&router, 1),
            vec![r#"{"center":[100],"span":[10],"s":[0,-1,-2,-3]}"#]
        );
        // Back at the threshold.
        assert_eq!(p.run_once(), Iteration::Skipped { depth: 5 });
    }

    #[test]
    fn closed_gate_pops_but_does_not_publish() {
        let router = router_with(1);
        let p = producer(router.clone(), ProducerConfig::default(), false);
        let queue = queue_with(7);
        let _ = p.set_queue(Arc::clone(&queue));

        assert_eq!(p.run_once(), Iteration::Suppressed);
        assert_eq!(queue.len(), 6);
        assert!(drain(&router, 1).is_empty());
    }

    #[test]
    fn estimator_failure_only_skips_iteration() {
        let router = router_with(1);
        let p = producer(router.clone(), ProducerConfig::default(), true);
        let _ = p.gate().attach();
        let _ = p.set_queue(queue_with(8));

        assert_eq!(p.run_once(), Iteration::Failed);
        assert_eq!(p.run_once(), Iteration::Failed);
        assert!(drain(&router, 1).is_empty());
    }

    #[test]
    fn permission_restricts_recipients() {
        let router = router_with(2);
        let _ = router
            .grant_permission(ConnectionId::new(2), "spectrum")
            .unwrap();
        let config = ProducerConfig {
            permission: Some("spectrum".into()),
            ..ProducerConfig::default()
        };
        let p = producer(router.clone(), config, false);
        let _ = p.gate().attach();
        let _ = p.set_queue(queue_with(6));

        assert_eq!(p.run_once(), Iteration::Published { recipients: 1 });
        assert!(drain(&router, 1).is_empty());
        assert_eq!(drain(&router, 2).len(), 1);
    }

    #[test]
    fn tuning_change_is_reflected() {
        let router = router_with(1);
        let p = producer(router.clone(), ProducerConfig::default(), false);
        let _ = p.gate().attach();
        let _ = p.set_queue(queue_with(6));
        p.set_center(433_920_000.0);
        p.set_span(250_000.0);

        let _ = p.run_once();
        let msg = drain(&router, 1).pop().unwrap();
        assert!(msg.starts_with(r#"{"center":[433920000],"span":[250000],"#), "{msg}");
    }

    #[test]
    fn set_queue_returns_previous() {
        let p = producer(router_with(0), ProducerConfig::default(), false);
        assert!(p.set_queue(queue_with(0)).is_none());
        let second = queue_with(1);
        assert!(p.set_queue(Arc::clone(&second)).is_some());
        assert!(Arc::ptr_eq(&p.queue().unwrap(), &second));
        assert!(p.take_queue().is_some());
        assert!(p.queue().is_none());
    }

    #[test]
    fn terminate_before_run_stops_immediately() {
        let p = producer(router_with(0), ProducerConfig::default(), false);
        assert_eq!(p.state(), ProducerState::Idle);
        p.terminate();
        p.run();
        assert_eq!(p.state(), ProducerState::Stopped);
    }

    #[test]
    fn run_publishes_then_terminates() {
        let router = router_with(1);
        let config = ProducerConfig {
            backpressure_threshold: 0,
            wait_timeout: Duration::from_millis(5),
            permission: None,
        };
        let p = Arc::new(SpectrogramProducer::new(
            router.clone(),
            Box::new(WelchEstimator::new(16).unwrap()),
            config,
            Tuning {
                center: 1.0,
                span: 2.0,
            },
        ));
        let _ = p.gate().attach();
        let queue = queue_with(3);
        let _ = p.set_queue(Arc::clone(&queue));

        let worker = {
            let p = Arc::clone(&p);
            std::thread::spawn(move || p.run())
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !queue.is_empty() {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        p.terminate();
        worker.join().unwrap();

        assert_eq!(p.state(), ProducerState::Stopped);
        let messages = drain(&router, 1);
        assert_eq!(messages.len(), 3);
        let parsed: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(parsed["s"].as_array().unwrap().len(), 16);
    }

    #[test]
    fn config_from_settings() {
        let settings = SpectrumSettings {
            backpressure_threshold: 2,
            wait_timeout_ms: 7,
            permission: Some("spectrum".into()),
            ..SpectrumSettings::default()
        };
        let config = ProducerConfig::from(&settings);
        assert_eq!(config.backpressure_threshold, 2);
        assert_eq!(config.wait_timeout, Duration::from_millis(7));
        assert_eq!(config.permission.as_deref(), Some("spectrum"));
        let tuning = Tuning::from(&settings);
        assert_eq!(tuning.center, settings.center_frequency);
    }
}
