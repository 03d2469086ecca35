//! Configuration system for fsweep.
//!
//! - TOML file loading with serde defaults
//! - `FSWEEP_*` environment overlays with source tracking
//! - Validation that reports every problem at once

pub mod env;
pub mod source;
pub mod sweep;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};
pub use sweep::{
    ConfigError, DEFAULT_CONFIG_FILE, EncryptionSettings, LoadedConfig, SweepAxes, SweepConfig,
};

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
