//! # Migration Engine
//!
//! The claim, convert and record loop: the converter contract, the per-batch
//! runner, throttled progress reporting and the run-level controller.

pub mod batch_runner;
pub mod controller;
pub mod converter;
pub mod progress;
pub mod stop;

pub use batch_runner::{BatchResult, BatchRunner};
pub use controller::MigrationController;
pub use converter::{ConversionContext, ConversionOutcome, RecordConverter};
pub use progress::{ProgressReporter, ProgressSink, StartBanner, TracingProgressSink};
pub use stop::StopHandle;
