//! Shared types and utilities for fsweep.
//!
//! This crate holds everything the sweep engine needs that is not specific to
//! one component: configuration loading, the value types that flow between
//! components, the external process contract, and logging setup.

#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod process;
pub mod types;

pub use config::{
    ConfigError, ConfigSource, EncryptionSettings, LoadedConfig, SweepAxes, SweepConfig,
};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use process::{CommandOutcome, CommandRunner, DryRunRunner, Invocation, SystemRunner};
pub use types::{
    DeviceTarget, EncryptionProfile, FailurePolicy, Mode, ParseKindError, Secret, SweepPass,
    TargetType, device_name, fio_filename,
};
