//! Spectrum pipeline error types.

use thiserror::Error;

/// Errors raised by the sample queue and the estimator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpectrumError {
    /// The batch had no samples.
    #[error("sample batch is empty")]
    EmptyBatch,
    /// The batch is shorter than one analysis window.
    #[error("need at least {needed} samples, got {got}")]
    InsufficientSamples {
        /// Samples in one window.
        needed: usize,
        /// Samples supplied.
        got: usize,
    },
    /// The transform size cannot be used.
    #[error("invalid transform size: {0}")]
    InvalidTransformSize(usize),
    /// Estimator-specific failure.
    #[error("estimator failed: {0}")]
    Estimator(String),
    /// The sample queue is at capacity.
    #[error("sample queue is full")]
    QueueFull,
}

/// Result type for spectrum operations.
pub type Result<T> = std::result::Result<T, SpectrumError>;
