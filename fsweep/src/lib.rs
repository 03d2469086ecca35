//! fio parameter sweeps over plain and LUKS-encrypted block devices.
//!
//! The binary wires these pieces together; they are exposed as a library so
//! integration tests can drive the orchestrator with scripted runners.

#![forbid(unsafe_code)]

pub mod confirm;
pub mod display;
pub mod fio;
pub mod luks;
pub mod orchestrator;
pub mod output;
pub mod preflight;
pub mod report;
pub mod sweep;

pub use confirm::{AutoConfirm, Confirm, PromptConfirm};
pub use fio::{BenchmarkError, BenchmarkRequest, BenchmarkRun, FioRunner, FioSettings};
pub use luks::{CloseOutcome, VolumeError, VolumeManager, VolumeSettings, VolumeState};
pub use orchestrator::{Orchestrator, SweepError};
pub use report::{JobOutcome, JobStatus, PassReport, SweepReport, VolumeRecord};
pub use sweep::JobSpec;
