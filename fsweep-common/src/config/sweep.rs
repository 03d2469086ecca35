//! Sweep configuration: parameter axes plus the global run settings.
//!
//! Loaded once at startup (file, then environment, then CLI flags applied by
//! the binary) and immutable afterwards.

use super::env::{EnvError, EnvParser};
use super::source::{ConfigSource, Sourced};
use crate::types::{DeviceTarget, FailurePolicy, Mode, Secret, SweepPass, TargetType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "fsweep.toml";

/// Longest accepted per-job runtime (one week).
const MAX_RUNTIME_SECS: u64 = 7 * 24 * 3600;

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+([kKmMgGtTpP][iI]?[bB]?)?$").expect("size regex is valid")
});

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,3}%$").expect("percent regex is valid"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    #[error("invalid environment overrides:\n  - {}", join_errors(.0))]
    Env(Vec<EnvError>),

    #[error("cannot expand '{value}': {reason}")]
    Expansion { value: String, reason: String },

    #[error("cannot load passphrase from {path}: {reason}")]
    Passphrase { path: PathBuf, reason: String },
}

/// The cross-product axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepAxes {
    pub modes: Vec<Mode>,
    pub iodepths: Vec<u32>,
    pub numjobs: Vec<u32>,
    pub block_sizes: Vec<String>,
    /// Read percentages for mixed modes; ignored by pure read/write modes.
    pub rwmixread: Vec<u8>,
    /// Emit one mix-less job per mixed-mode combination besides the mix jobs.
    pub mixed_baseline: bool,
}

impl Default for SweepAxes {
    fn default() -> Self {
        Self {
            modes: vec![Mode::Read, Mode::Write, Mode::RandRw],
            iodepths: vec![1, 8, 16],
            numjobs: vec![1, 3, 8],
            block_sizes: ["4k", "16k", "128k", "4M"].map(String::from).to_vec(),
            rwmixread: vec![50, 30, 70],
            mixed_baseline: true,
        }
    }
}

/// LUKS settings for encrypted passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncryptionSettings {
    /// Detached header path is `{header_prefix}{device}.img`.
    pub header_prefix: String,
    /// `fallocate -l` size for a new header.
    pub header_size: String,
    /// Mapping name is `{mapping_prefix}{device}`.
    pub mapping_prefix: String,
    /// Answer used for "remove header?" when running unattended.
    pub remove_header: bool,
    /// Read the passphrase from this file (trailing newline stripped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_file: Option<PathBuf>,
    /// Literal passphrase. Accepted for lab machines only.
    #[serde(skip_serializing)]
    pub passphrase: Option<Secret>,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            header_prefix: "/var/tmp/luksheader.".to_string(),
            header_size: "2M".to_string(),
            mapping_prefix: "encrypted-".to_string(),
            remove_header: false,
            passphrase_file: None,
            passphrase: None,
        }
    }
}

/// Everything one sweep run needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// fio `--runtime` per job.
    pub runtime_secs: u64,
    pub time_based: bool,
    /// fio `--size`; required for file targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub ioengine: String,
    pub direct: bool,
    /// Multiplies every `numjobs` value (one job per device on multi-device targets).
    pub numjobs_multiplier: u32,
    pub target_type: TargetType,
    /// Must be set to run write patterns against raw devices.
    pub destructive: bool,
    /// Base output directory; `$HOME` and `~` are expanded.
    pub output_root: String,
    pub passes: Vec<SweepPass>,
    pub interactive: bool,
    pub dry_run: bool,
    pub on_failure: FailurePolicy,
    pub axes: SweepAxes,
    pub encryption: EncryptionSettings,
    pub targets: Vec<DeviceTarget>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            runtime_secs: 60,
            time_based: true,
            size: None,
            ioengine: "libaio".to_string(),
            direct: true,
            numjobs_multiplier: 1,
            target_type: TargetType::Device,
            destructive: false,
            output_root: "$HOME/benchmark/fio".to_string(),
            passes: vec![SweepPass::Plain],
            interactive: false,
            dry_run: false,
            on_failure: FailurePolicy::Continue,
            axes: SweepAxes::default(),
            encryption: EncryptionSettings::default(),
            targets: vec![DeviceTarget::single("/dev/nvme0n1")],
        }
    }
}

/// A configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SweepConfig,
    pub source: ConfigSource,
    /// Environment variables that overrode file/default values.
    pub env_overrides: Vec<String>,
}

impl SweepConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// File (explicit, else `./fsweep.toml` if present, else defaults), then
    /// `FSWEEP_*` overrides. Validation is left to the caller so CLI flags
    /// can be layered on first.
    pub fn load(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let (mut config, source) = match path {
            Some(path) => (Self::from_file(path)?, ConfigSource::File(path.to_path_buf())),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                (Self::from_file(path)?, ConfigSource::File(path.to_path_buf()))
            }
            None => (Self::default(), ConfigSource::Default),
        };
        debug!(source = %source, "Loaded sweep configuration");

        let env_overrides = config.apply_env()?;
        Ok(LoadedConfig {
            config,
            source,
            env_overrides,
        })
    }

    /// Overlay `FSWEEP_*` variables. Returns the names of variables applied.
    pub fn apply_env(&mut self) -> Result<Vec<String>, ConfigError> {
        fn take<T>(sourced: Sourced<T>, applied: &mut Vec<String>) -> T {
            if let Some(var) = sourced.var {
                applied.push(var);
            }
            sourced.value
        }

        let mut parser = EnvParser::new();
        let mut applied = Vec::new();

        self.output_root = take(parser.get_string("OUTPUT_ROOT", &self.output_root), &mut applied);
        self.runtime_secs = take(
            parser.get_u64_range("RUNTIME", self.runtime_secs, 1, MAX_RUNTIME_SECS),
            &mut applied,
        );
        self.interactive = take(parser.get_bool("INTERACTIVE", self.interactive), &mut applied);
        self.dry_run = take(parser.get_bool("DRY_RUN", self.dry_run), &mut applied);
        self.destructive = take(parser.get_bool("DESTRUCTIVE", self.destructive), &mut applied);
        self.encryption.header_prefix = take(
            parser.get_string("HEADER_PREFIX", &self.encryption.header_prefix),
            &mut applied,
        );
        self.on_failure = take(
            parser.get_parsed("ON_FAILURE", self.on_failure, "continue, abort-pass or abort-all"),
            &mut applied,
        );

        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        for var in &applied {
            debug!(var = %var, "Environment override applied");
        }
        Ok(applied)
    }

    /// Check every invariant, reporting all violations together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let axes = &self.axes;

        if axes.modes.is_empty() {
            problems.push("axes.modes must not be empty".to_string());
        }
        if axes.iodepths.is_empty() {
            problems.push("axes.iodepths must not be empty".to_string());
        }
        if axes.numjobs.is_empty() {
            problems.push("axes.numjobs must not be empty".to_string());
        }
        if axes.block_sizes.is_empty() {
            problems.push("axes.block_sizes must not be empty".to_string());
        }
        if axes.iodepths.contains(&0) {
            problems.push("axes.iodepths values must be at least 1".to_string());
        }
        if axes.numjobs.contains(&0) {
            problems.push("axes.numjobs values must be at least 1".to_string());
        }
        for mix in &axes.rwmixread {
            if *mix > 100 {
                problems.push(format!("axes.rwmixread value {mix} is not a percentage"));
            }
        }
        for bs in &axes.block_sizes {
            if !SIZE_RE.is_match(bs) {
                problems.push(format!("axes.block_sizes value '{bs}' is not a fio size"));
            }
        }
        if axes.modes.iter().any(Mode::is_mixed) && axes.rwmixread.is_empty() && !axes.mixed_baseline
        {
            problems.push(
                "mixed modes need axes.rwmixread values or axes.mixed_baseline = true".to_string(),
            );
        }

        // Duplicate axis values would produce duplicate job names.
        check_unique("axes.modes", &axes.modes, &mut problems);
        check_unique("axes.iodepths", &axes.iodepths, &mut problems);
        check_unique("axes.numjobs", &axes.numjobs, &mut problems);
        check_unique("axes.block_sizes", &axes.block_sizes, &mut problems);
        check_unique("axes.rwmixread", &axes.rwmixread, &mut problems);

        if self.runtime_secs == 0 || self.runtime_secs > MAX_RUNTIME_SECS {
            problems.push(format!(
                "runtime_secs must be between 1 and {MAX_RUNTIME_SECS}"
            ));
        }
        if self.numjobs_multiplier == 0 {
            problems.push("numjobs_multiplier must be at least 1".to_string());
        }
        if self.ioengine.trim().is_empty() {
            problems.push("ioengine must not be empty".to_string());
        }
        if let Some(size) = &self.size
            && !SIZE_RE.is_match(size)
            && !PERCENT_RE.is_match(size)
        {
            problems.push(format!("size '{size}' is not a fio size"));
        }
        if self.output_root.trim().is_empty() {
            problems.push("output_root must not be empty".to_string());
        }

        if self.passes.is_empty() {
            problems.push("passes must list at least one pass (e.g. \"none\")".to_string());
        }
        check_unique("passes", &self.passes, &mut problems);

        if self.targets.is_empty() {
            problems.push("targets must list at least one target".to_string());
        }
        for (idx, target) in self.targets.iter().enumerate() {
            if target.devices.is_empty() {
                problems.push(format!("targets[{idx}] has no devices"));
            }
            let unique: HashSet<_> = target.devices.iter().collect();
            if unique.len() != target.devices.len() {
                problems.push(format!("targets[{idx}] lists a device twice"));
            }
        }
        let ids: Vec<String> = self.targets.iter().map(DeviceTarget::id).collect();
        check_unique("target identifiers", &ids, &mut problems);

        match self.target_type {
            TargetType::File => {
                if self.size.is_none() {
                    problems.push("file targets require size".to_string());
                }
                if self.has_encrypted_passes() {
                    problems.push("encrypted passes require target_type = \"device\"".to_string());
                }
            }
            TargetType::Device => {
                let writes: Vec<&str> = axes
                    .modes
                    .iter()
                    .filter(|m| m.writes())
                    .map(Mode::as_str)
                    .collect();
                if !writes.is_empty() && !self.destructive {
                    problems.push(format!(
                        "modes {} overwrite raw devices; set destructive = true to allow",
                        writes.join(", ")
                    ));
                }
            }
        }

        if self.has_encrypted_passes() {
            let enc = &self.encryption;
            if enc.header_prefix.trim().is_empty() {
                problems.push("encryption.header_prefix must not be empty".to_string());
            }
            if enc.mapping_prefix.trim().is_empty() || enc.mapping_prefix.contains('/') {
                problems.push("encryption.mapping_prefix must be a plain name prefix".to_string());
            }
            if !SIZE_RE.is_match(&enc.header_size) {
                problems.push(format!(
                    "encryption.header_size '{}' is not a size",
                    enc.header_size
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn has_encrypted_passes(&self) -> bool {
        self.passes.iter().any(SweepPass::is_encrypted)
    }

    /// Output root with `$HOME`/`~` expanded.
    pub fn output_root_path(&self) -> Result<PathBuf, ConfigError> {
        shellexpand::full(&self.output_root)
            .map(|expanded| PathBuf::from(expanded.as_ref()))
            .map_err(|e| ConfigError::Expansion {
                value: self.output_root.clone(),
                reason: e.to_string(),
            })
    }

    /// Passphrase lookup order: `FSWEEP_LUKS_PASSPHRASE`, `passphrase_file`,
    /// literal `passphrase`.
    pub fn resolve_passphrase(&self) -> Result<Option<Secret>, ConfigError> {
        let mut parser = EnvParser::new();
        if let Some(value) = parser.get_optional_string("LUKS_PASSPHRASE").value {
            return Ok(Some(Secret::new(value)));
        }

        if let Some(path) = &self.encryption.passphrase_file {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Passphrase {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            let trimmed = content.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                return Err(ConfigError::Passphrase {
                    path: path.clone(),
                    reason: "file is empty".to_string(),
                });
            }
            return Ok(Some(Secret::new(trimmed)));
        }

        if let Some(secret) = &self.encryption.passphrase {
            warn!("Using literal passphrase from config file; prefer FSWEEP_LUKS_PASSPHRASE");
            return Ok(Some(secret.clone()));
        }

        Ok(None)
    }

    /// Render as TOML (the literal passphrase is never written out).
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n  - ")
}

fn check_unique<T: Eq + Hash + std::fmt::Debug>(what: &str, values: &[T], problems: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            problems.push(format!("{what} contains duplicate value {value:?}"));
        }
    }
}
