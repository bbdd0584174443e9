//! # specmux-spectrum
//!
//! Producer side of the spectrogram service.
//!
//! - **Queue**: [`queue::SampleQueue`] bounded FIFO of complex sample batches
//! - **Estimator**: [`estimator::WelchEstimator`] power spectrum over a fixed transform size
//! - **Message**: [`message::encode_spectrum`] the wire format sent to clients
//! - **Producer**: [`producer::SpectrogramProducer`] depth-gated estimate-and-broadcast loop
//! - **Handler**: [`handler::SpectrogramHandler`] client attach/detach and commands
//! - **Source**: [`source::SweepSource`] synthetic sweeping tone for running without a radio
//!
//! ## Crate Position
//!
//! Depends on: specmux-core, specmux-server, specmux-settings.
//! Depended on by: specmux.

#![deny(unsafe_code)]

pub mod command;
pub mod errors;
pub mod estimator;
pub mod gate;
pub mod handler;
pub mod message;
pub mod producer;
pub mod queue;
pub mod source;

pub use command::ClientCommand;
pub use errors::{Result, SpectrumError};
pub use estimator::{PowerSpectrumEstimator, WelchEstimator};
pub use gate::ClientGate;
pub use handler::SpectrogramHandler;
pub use message::encode_spectrum;
pub use producer::{Iteration, ProducerConfig, ProducerState, SpectrogramProducer, Tuning};
pub use queue::{SampleBatch, SampleQueue};
pub use source::SweepSource;
