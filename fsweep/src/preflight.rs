//! Host checks before any device is touched.

use fsweep_common::{SweepConfig, TargetType};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("required tool `{tool}` not found on PATH")]
    ToolMissing { tool: &'static str },

    #[error("target {path} does not exist")]
    TargetMissing { path: PathBuf },

    #[error("target {path} is not a block device")]
    NotBlockDevice { path: PathBuf },
}

/// Tools the configured sweep will invoke.
pub fn required_tools(config: &SweepConfig) -> Vec<&'static str> {
    let mut tools = vec!["fio"];
    if config.has_encrypted_passes() {
        tools.extend(["cryptsetup", "dmsetup", "fallocate"]);
    }
    tools
}

/// Every problem found; empty means ready to run.
pub fn check(config: &SweepConfig) -> Vec<PreflightError> {
    let mut problems = Vec::new();

    for tool in required_tools(config) {
        match which::which(tool) {
            Ok(path) => debug!(tool, path = %path.display(), "Found tool"),
            Err(e) => {
                warn!(tool, error = %e, "Required tool missing");
                problems.push(PreflightError::ToolMissing { tool });
            }
        }
    }

    if config.target_type == TargetType::Device {
        for target in &config.targets {
            for device in &target.devices {
                if let Err(problem) = check_block_device(device) {
                    problems.push(problem);
                }
            }
        }
    }

    problems
}

#[cfg(unix)]
fn check_block_device(path: &Path) -> Result<(), PreflightError> {
    use std::os::unix::fs::FileTypeExt;

    let meta = std::fs::metadata(path).map_err(|_| PreflightError::TargetMissing {
        path: path.to_path_buf(),
    })?;
    if meta.file_type().is_block_device() {
        Ok(())
    } else {
        Err(PreflightError::NotBlockDevice {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(not(unix))]
fn check_block_device(path: &Path) -> Result<(), PreflightError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PreflightError::TargetMissing {
            path: path.to_path_buf(),
        })
    }
}
