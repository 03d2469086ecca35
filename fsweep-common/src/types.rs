//! Core value types shared by the sweep generator, the volume lifecycle
//! manager and the fio adapter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a textual value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

// =============================================================================
// I/O pattern
// =============================================================================

/// fio I/O pattern (`--rw`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "write")]
    Write,
    #[serde(rename = "randread")]
    RandRead,
    #[serde(rename = "randwrite")]
    RandWrite,
    #[serde(rename = "rw", alias = "readwrite")]
    ReadWrite,
    #[serde(rename = "randrw")]
    RandRw,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Read,
        Mode::Write,
        Mode::RandRead,
        Mode::RandWrite,
        Mode::ReadWrite,
        Mode::RandRw,
    ];

    /// Name understood by fio's `--rw` option.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::RandRead => "randread",
            Self::RandWrite => "randwrite",
            Self::ReadWrite => "rw",
            Self::RandRw => "randrw",
        }
    }

    /// Mixed read/write patterns take a `rwmixread` percentage.
    pub fn is_mixed(&self) -> bool {
        matches!(self, Self::ReadWrite | Self::RandRw)
    }

    /// Whether the pattern writes to the target (destroys data on raw devices).
    pub fn writes(&self) -> bool {
        !matches!(self, Self::Read | Self::RandRead)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "randread" => Ok(Self::RandRead),
            "randwrite" => Ok(Self::RandWrite),
            "rw" | "readwrite" => Ok(Self::ReadWrite),
            "randrw" => Ok(Self::RandRw),
            _ => Err(ParseKindError {
                kind: "mode",
                value: s.to_string(),
                expected: "read, write, randread, randwrite, rw, randrw",
            }),
        }
    }
}

// =============================================================================
// Encryption profiles
// =============================================================================

const NO_WORKQUEUES: [&str; 2] = ["--perf-no_read_workqueue", "--perf-no_write_workqueue"];

/// dm-crypt tuning profile applied when the LUKS mapping is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionProfile {
    /// Kernel defaults, no `--perf-*` flags.
    Default,
    /// Bypass the kcryptd read and write workqueues.
    NoQueues,
    /// Submit writes from the crypt CPUs instead of a dedicated thread.
    #[serde(alias = "sub-crypt-cpus")]
    SubmitFromCryptCpus,
    /// Encrypt on the CPU that issued the I/O.
    SameCpuCrypt,
}

impl EncryptionProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::NoQueues => "no-queues",
            Self::SubmitFromCryptCpus => "submit-from-crypt-cpus",
            Self::SameCpuCrypt => "same-cpu-crypt",
        }
    }

    /// `cryptsetup open` flags for this profile.
    pub fn tuning_flags(&self) -> Vec<&'static str> {
        match self {
            Self::Default => Vec::new(),
            Self::NoQueues => NO_WORKQUEUES.to_vec(),
            Self::SubmitFromCryptCpus => {
                let mut flags = vec!["--perf-submit_from_crypt_cpus"];
                flags.extend(NO_WORKQUEUES);
                flags
            }
            Self::SameCpuCrypt => {
                let mut flags = vec!["--perf-same_cpu_crypt"];
                flags.extend(NO_WORKQUEUES);
                flags
            }
        }
    }
}

impl fmt::Display for EncryptionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionProfile {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "no-queues" => Ok(Self::NoQueues),
            "submit-from-crypt-cpus" | "sub-crypt-cpus" => Ok(Self::SubmitFromCryptCpus),
            "same-cpu-crypt" => Ok(Self::SameCpuCrypt),
            _ => Err(ParseKindError {
                kind: "encryption profile",
                value: s.to_string(),
                expected: "default, no-queues, submit-from-crypt-cpus, same-cpu-crypt",
            }),
        }
    }
}

/// One pass over the sweep: either the raw device or a LUKS mapping opened
/// with a tuning profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SweepPass {
    Plain,
    Encrypted(EncryptionProfile),
}

impl SweepPass {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Plain => "none",
            Self::Encrypted(profile) => profile.as_str(),
        }
    }

    pub fn profile(&self) -> Option<EncryptionProfile> {
        match self {
            Self::Plain => None,
            Self::Encrypted(profile) => Some(*profile),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }

    /// Suffix appended to job names and output directories.
    pub fn name_suffix(&self) -> String {
        match self {
            Self::Plain => String::new(),
            Self::Encrypted(profile) => format!("_luks_{}", profile.as_str()),
        }
    }
}

impl fmt::Display for SweepPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SweepPass {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "plain" => Ok(Self::Plain),
            other => other
                .parse::<EncryptionProfile>()
                .map(Self::Encrypted)
                .map_err(|_| ParseKindError {
                    kind: "sweep pass",
                    value: s.to_string(),
                    expected: "none, default, no-queues, submit-from-crypt-cpus, same-cpu-crypt",
                }),
        }
    }
}

impl TryFrom<String> for SweepPass {
    type Error = ParseKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SweepPass> for String {
    fn from(pass: SweepPass) -> Self {
        pass.label().to_string()
    }
}

// =============================================================================
// Targets
// =============================================================================

/// What fio is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Raw block device(s).
    #[default]
    Device,
    /// Regular file(s); fio needs an explicit `size`.
    File,
}

/// A single device or an ordered set of devices benchmarked together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceTarget {
    pub devices: Vec<PathBuf>,
    /// Overrides the identifier derived from the device names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DeviceTarget {
    pub fn single(device: impl Into<PathBuf>) -> Self {
        Self {
            devices: vec![device.into()],
            label: None,
        }
    }

    pub fn multi<I, P>(devices: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Identifier used in output directory names.
    pub fn id(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        self.devices
            .iter()
            .map(|d| device_name(d))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Final path component of a device (`/dev/nvme0n1` → `nvme0n1`).
pub fn device_name(device: &Path) -> String {
    device
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| device.to_string_lossy().replace('/', "_"))
}

/// fio `--filename` value: several targets are joined with `:`.
pub fn fio_filename(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

// =============================================================================
// Failure policy
// =============================================================================

/// What the orchestrator does when a volume or benchmark step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next job.
    #[default]
    Continue,
    /// Skip the rest of the current pass, then carry on with the next one.
    AbortPass,
    /// Tear down the current pass and stop the run.
    AbortAll,
}

impl FromStr for FailurePolicy {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort-pass" | "abort-profile" => Ok(Self::AbortPass),
            "abort-all" => Ok(Self::AbortAll),
            _ => Err(ParseKindError {
                kind: "failure policy",
                value: s.to_string(),
                expected: "continue, abort-pass, abort-all",
            }),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continue => "continue",
            Self::AbortPass => "abort-pass",
            Self::AbortAll => "abort-all",
        })
    }
}

// =============================================================================
// Secrets
// =============================================================================

/// A passphrase that never shows up in logs or debug output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
