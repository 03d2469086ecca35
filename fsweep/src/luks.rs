//! LUKS volume lifecycle for encrypted passes.
//!
//! Each device gets a detached header file and a dm-crypt mapping named
//! after the device. [`VolumeManager::ensure_open`] brings the mapping up
//! under a tuning profile, formatting the device first when there is no
//! usable header; [`VolumeManager::refresh`] reloads the flags of a mapping
//! that was already active; [`VolumeManager::close`] tears the mapping down
//! and offers to delete the header.

use crate::confirm::Confirm;
use fsweep_common::{
    CommandOutcome, CommandRunner, EncryptionProfile, EncryptionSettings, Invocation, Secret,
    device_name,
};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const CRYPTSETUP: &str = "cryptsetup";
const DMSETUP: &str = "dmsetup";
const FALLOCATE: &str = "fallocate";
const MAPPER_DIR: &str = "/dev/mapper";

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed for {device} (exit {code:?}): {stderr}")]
    CommandFailed {
        device: String,
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("inconsistent encryption state for {device}: header {header} present={header_present}, signature unknown")]
    Inconsistent {
        device: String,
        header: PathBuf,
        header_present: bool,
    },

    #[error("failed to close mapping {mapping} (exit {code:?}): {stderr}")]
    CloseFailed {
        mapping: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("failed to remove header {path}: {source}")]
    HeaderRemoval {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What `ensure_open` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeState {
    /// New header allocated, device formatted, mapping opened.
    Formatted,
    /// Existing header reused to open the mapping.
    Opened,
    /// Mapping was already active; nothing was done.
    AlreadyOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub mapping: String,
    pub header: PathBuf,
    pub header_removed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signature {
    Present,
    Absent,
    Unknown(Option<i32>),
}

/// Naming and sizing for headers and mappings.
#[derive(Debug, Clone)]
pub struct VolumeSettings {
    pub header_prefix: String,
    pub header_size: String,
    pub mapping_prefix: String,
    /// Unattended answer to "remove header?".
    pub remove_header: bool,
    pub passphrase: Secret,
}

impl VolumeSettings {
    pub fn from_config(settings: &EncryptionSettings, passphrase: Secret) -> Self {
        Self {
            header_prefix: settings.header_prefix.clone(),
            header_size: settings.header_size.clone(),
            mapping_prefix: settings.mapping_prefix.clone(),
            remove_header: settings.remove_header,
            passphrase,
        }
    }
}

pub struct VolumeManager<R, C> {
    runner: R,
    confirm: C,
    settings: VolumeSettings,
}

impl<R: CommandRunner, C: Confirm> VolumeManager<R, C> {
    pub fn new(runner: R, confirm: C, settings: VolumeSettings) -> Self {
        Self {
            runner,
            confirm,
            settings,
        }
    }

    /// `{header_prefix}{device}.img`
    pub fn header_path(&self, device: &Path) -> PathBuf {
        PathBuf::from(format!(
            "{}{}.img",
            self.settings.header_prefix,
            device_name(device)
        ))
    }

    /// `{mapping_prefix}{device}`
    pub fn mapping_name(&self, device: &Path) -> String {
        format!("{}{}", self.settings.mapping_prefix, device_name(device))
    }

    /// Block device the benchmark should target once the mapping is open.
    pub fn mapping_path(&self, device: &Path) -> PathBuf {
        Path::new(MAPPER_DIR).join(self.mapping_name(device))
    }

    /// Make sure `device` is exposed through its dm-crypt mapping.
    pub fn ensure_open(
        &self,
        device: &Path,
        profile: EncryptionProfile,
    ) -> Result<VolumeState, VolumeError> {
        let header = self.header_path(device);
        let mapping = self.mapping_name(device);

        let mut signature = self.query_signature(device, &header)?;
        if let Signature::Unknown(code) = signature {
            warn!(
                device = %device.display(),
                header = %header.display(),
                exit_code = ?code,
                "Cannot tell whether the device carries a LUKS signature"
            );
            let question = format!(
                "LUKS state of {} is unclear (header {}). Re-check?",
                device.display(),
                header.display()
            );
            if self.confirm.confirm(&question, false) {
                signature = self.query_signature(device, &header)?;
            }
            if let Signature::Unknown(_) = signature {
                return Err(VolumeError::Inconsistent {
                    device: device.display().to_string(),
                    header_present: header.exists(),
                    header,
                });
            }
        }

        if !header.exists() || signature == Signature::Absent {
            info!(
                device = %device.display(),
                header = %header.display(),
                "Configuring LUKS, creating detached header"
            );
            self.initialize(device, &header)?;
            self.open(device, &header, &mapping, profile)?;
            return Ok(VolumeState::Formatted);
        }

        if self.is_open(device)? {
            info!(
                device = %device.display(),
                mapping = %self.mapping_path(device).display(),
                "Mapping already open"
            );
            return Ok(VolumeState::AlreadyOpen);
        }

        info!(
            device = %device.display(),
            header = %header.display(),
            profile = %profile,
            "Opening existing LUKS volume"
        );
        self.open(device, &header, &mapping, profile)?;
        Ok(VolumeState::Opened)
    }

    /// Close the mapping, then ask whether to delete the header file.
    pub fn close(&self, device: &Path) -> Result<CloseOutcome, VolumeError> {
        let mapping = self.mapping_name(device);
        let header = self.header_path(device);

        let invocation = Invocation::new(CRYPTSETUP).args(["close", mapping.as_str()]);
        let outcome = self.spawn(&invocation)?;
        if !outcome.is_success() {
            error!(
                mapping = %mapping,
                exit_code = ?outcome.code,
                stdout = %outcome.stdout.trim(),
                stderr = %outcome.stderr.trim(),
                "Closing LUKS mapping failed"
            );
            self.confirm.acknowledge(&format!(
                "Closing {mapping} failed (exit {:?}): {}",
                outcome.code,
                outcome.stderr.trim()
            ));
            return Err(VolumeError::CloseFailed {
                mapping,
                code: outcome.code,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
            });
        }
        info!(mapping = %mapping, "LUKS mapping closed");

        let question = format!("Remove LUKS header {}?", header.display());
        let mut header_removed = false;
        if header.exists() && self.confirm.confirm(&question, self.settings.remove_header) {
            if !self.runner.is_dry_run() {
                std::fs::remove_file(&header).map_err(|source| VolumeError::HeaderRemoval {
                    path: header.clone(),
                    source,
                })?;
            }
            info!(header = %header.display(), "Removed LUKS header");
            header_removed = true;
        }

        Ok(CloseOutcome {
            mapping,
            header,
            header_removed,
        })
    }

    /// Whether the device-mapper entry for `device` is active.
    pub fn is_open(&self, device: &Path) -> Result<bool, VolumeError> {
        let mapping = self.mapping_name(device);
        let outcome = self.spawn(&Invocation::new(DMSETUP).args(["info", mapping.as_str()]))?;
        debug!(mapping = %mapping, active = outcome.is_success(), "dmsetup info");
        Ok(outcome.is_success())
    }

    /// The signature lives in the detached header when one exists.
    fn query_signature(&self, device: &Path, header: &Path) -> Result<Signature, VolumeError> {
        let subject = if header.exists() { header } else { device };
        let outcome = self.spawn(
            &Invocation::new(CRYPTSETUP).args(["isLuks".to_string(), path_arg(subject)]),
        )?;
        let signature = match outcome.code {
            Some(0) => Signature::Present,
            Some(1) => Signature::Absent,
            other => Signature::Unknown(other),
        };
        debug!(subject = %subject.display(), ?signature, "cryptsetup isLuks");
        Ok(signature)
    }

    fn initialize(&self, device: &Path, header: &Path) -> Result<(), VolumeError> {
        self.run_checked(
            device,
            Invocation::new(FALLOCATE).args([
                "-l".to_string(),
                self.settings.header_size.clone(),
                path_arg(header),
            ]),
        )?;
        self.run_checked(
            device,
            Invocation::new(CRYPTSETUP)
                .args(["-q", "luksFormat", "--batch-mode", "--key-file=-", "--header"])
                .args([path_arg(header), path_arg(device)])
                .stdin_secret(&self.settings.passphrase),
        )?;
        Ok(())
    }

    fn open(
        &self,
        device: &Path,
        header: &Path,
        mapping: &str,
        profile: EncryptionProfile,
    ) -> Result<(), VolumeError> {
        self.run_checked(
            device,
            Invocation::new(CRYPTSETUP)
                .args(["-q", "open", "--type", "luks", "--key-file=-"])
                .args(profile.tuning_flags())
                .args(["--header".to_string(), path_arg(header)])
                .args([path_arg(device), mapping.to_string()])
                .stdin_secret(&self.settings.passphrase),
        )?;
        info!(
            device = %device.display(),
            mapping = %mapping,
            profile = %profile,
            "LUKS mapping opened"
        );
        Ok(())
    }

    /// Reload an active mapping so only `profile`'s flags are in effect.
    pub fn refresh(&self, device: &Path, profile: EncryptionProfile) -> Result<(), VolumeError> {
        let header = self.header_path(device);
        let mapping = self.mapping_name(device);
        self.run_checked(
            device,
            Invocation::new(CRYPTSETUP)
                .args(["-q", "refresh", "--type", "luks", "--key-file=-"])
                .args(profile.tuning_flags())
                .args(["--header".to_string(), path_arg(&header), mapping.clone()])
                .stdin_secret(&self.settings.passphrase),
        )?;
        info!(mapping = %mapping, profile = %profile, "LUKS mapping refreshed");
        Ok(())
    }

    fn spawn(&self, invocation: &Invocation) -> Result<CommandOutcome, VolumeError> {
        self.runner
            .run(invocation)
            .map_err(|source| VolumeError::Spawn {
                program: invocation.program.clone(),
                source,
            })
    }

    /// Run and turn a non-zero exit into a typed error after the operator
    /// has seen the captured output.
    fn run_checked(
        &self,
        device: &Path,
        invocation: Invocation,
    ) -> Result<CommandOutcome, VolumeError> {
        let outcome = self.spawn(&invocation)?;
        if outcome.is_success() {
            return Ok(outcome);
        }

        let command = invocation.display();
        error!(
            device = %device.display(),
            command = %command,
            exit_code = ?outcome.code,
            stdout = %outcome.stdout.trim(),
            stderr = %outcome.stderr.trim(),
            "Encryption command failed"
        );
        self.confirm.acknowledge(&format!(
            "`{command}` failed (exit {:?}): {}",
            outcome.code,
            outcome.stderr.trim()
        ));
        Err(VolumeError::CommandFailed {
            device: device.display().to_string(),
            command,
            code: outcome.code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        })
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
