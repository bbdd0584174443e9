//! Bounded queue of complex sample batches.
//!
//! Sources push from their own threads; the producer pops. Pushes never
//! block: a full queue rejects the batch.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustfft::num_complex::Complex32;

use crate::errors::{Result, SpectrumError};

/// One block of complex baseband samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBatch {
    /// Samples in arrival order.
    pub samples: Vec<Complex32>,
}

impl SampleBatch {
    /// Wrap samples.
    pub fn new(samples: Vec<Complex32>) -> Self {
        Self { samples }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the batch has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<Complex32>> for SampleBatch {
    fn from(samples: Vec<Complex32>) -> Self {
        Self::new(samples)
    }
}

struct Inner {
    batches: VecDeque<SampleBatch>,
    /// Incremented on every successful push.
    pushes: u64,
}

/// Bounded multi-producer FIFO with a push notification.
pub struct SampleQueue {
    inner: Mutex<Inner>,
    pushed: Condvar,
    capacity: usize,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` batches (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                batches: VecDeque::with_capacity(capacity.max(1)),
                pushes: 0,
            }),
            pushed: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a batch, or return [`SpectrumError::QueueFull`].
    pub fn try_push(&self, batch: SampleBatch) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.batches.len() >= self.capacity {
            return Err(SpectrumError::QueueFull);
        }
        inner.batches.push_back(batch);
        inner.pushes += 1;
        drop(inner);
        let _ = self.pushed.notify_all();
        Ok(())
    }

    /// Remove the oldest batch.
    pub fn try_pop(&self) -> Option<SampleBatch> {
        self.inner.lock().batches.pop_front()
    }

    /// Batches currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().batches.len()
    }

    /// Whether no batches are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of batches.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until the next push or until `timeout` elapses.
    ///
    /// Returns `true` if a push happened.
    pub fn wait_for_push(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        let seen = inner.pushes;
        while inner.pushes == seen {
            if self.pushed.wait_until(&mut inner, deadline).timed_out() {
                return inner.pushes != seen;
            }
        }
        true
    }
}
