//! fio adapter.
//!
//! Turns a [`JobSpec`] plus its target into an fio argument list, runs it,
//! and reads the JSON result back as an opaque value.

use crate::output;
use crate::sweep::JobSpec;
use fsweep_common::{CommandRunner, Invocation, SweepConfig, SweepPass, fio_filename};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("failed to run fio for {job}: {source}")]
    Spawn {
        job: String,
        #[source]
        source: io::Error,
    },

    #[error("fio failed for {job} (exit {code:?}): {stderr}")]
    FioFailed {
        job: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Run-wide fio knobs that do not vary per job.
#[derive(Debug, Clone)]
pub struct FioSettings {
    pub program: String,
    pub ioengine: String,
    pub direct: bool,
    pub time_based: bool,
    pub size: Option<String>,
    pub numjobs_multiplier: u32,
}

impl Default for FioSettings {
    fn default() -> Self {
        Self {
            program: "fio".to_string(),
            ioengine: "libaio".to_string(),
            direct: true,
            time_based: true,
            size: None,
            numjobs_multiplier: 1,
        }
    }
}

impl FioSettings {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            ioengine: config.ioengine.clone(),
            direct: config.direct,
            time_based: config.time_based,
            size: config.size.clone(),
            numjobs_multiplier: config.numjobs_multiplier,
            ..Self::default()
        }
    }
}

/// One job against one target.
#[derive(Debug, Clone)]
pub struct BenchmarkRequest<'a> {
    pub job: &'a JobSpec,
    /// Paths fio reads/writes; a mapper device per target device on encrypted passes.
    pub filenames: &'a [PathBuf],
    pub device_id: &'a str,
    pub pass: &'a SweepPass,
    pub pass_dir: &'a Path,
}

impl BenchmarkRequest<'_> {
    pub fn job_dir(&self) -> PathBuf {
        output::job_dir(self.pass_dir, self.device_id, self.job)
    }

    pub fn output_file(&self) -> PathBuf {
        output::job_output_file(&self.job_dir(), self.job)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRun {
    pub job_name: String,
    pub output_file: PathBuf,
    pub command: String,
    /// fio's JSON output, uninterpreted. `None` when unreadable or in dry-run.
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

pub struct FioRunner<R> {
    runner: R,
    settings: FioSettings,
}

impl<R: CommandRunner> FioRunner<R> {
    pub fn new(runner: R, settings: FioSettings) -> Self {
        Self { runner, settings }
    }

    pub fn invocation(&self, request: &BenchmarkRequest<'_>) -> Invocation {
        let job = request.job;
        let s = &self.settings;

        let mut inv = Invocation::new(&s.program)
            .arg(format!("--name={}", job.name))
            .arg(format!("--rw={}", job.mode));
        if let Some(mix) = job.rwmix {
            inv = inv.arg(format!("--rwmixread={mix}"));
        }
        inv = inv
            .arg(format!("--direct={}", u8::from(s.direct)))
            .arg(format!("--filename={}", fio_filename(request.filenames)))
            .arg(format!("--ioengine={}", s.ioengine))
            .arg(format!("--iodepth={}", job.iodepth))
            .arg(format!(
                "--numjobs={}",
                job.numjobs.saturating_mul(s.numjobs_multiplier)
            ))
            .arg(format!("--runtime={}", job.runtime_secs));
        if s.time_based {
            inv = inv.arg("--time_based");
        }
        inv = inv.arg(format!("--bs={}", job.block_size));
        if let Some(size) = &s.size {
            inv = inv.arg(format!("--size={size}"));
        }
        inv.args([
            "--group_reporting".to_string(),
            "--output-format=json".to_string(),
            format!("--output={}", request.output_file().display()),
        ])
    }

    pub fn run(&self, request: &BenchmarkRequest<'_>) -> Result<BenchmarkRun, BenchmarkError> {
        let job_name = request.job.name.clone();
        let job_dir = request.job_dir();
        let output_file = request.output_file();
        let invocation = self.invocation(request);
        let dry_run = self.runner.is_dry_run();

        if !dry_run {
            output::ensure_dir(&job_dir).map_err(|source| BenchmarkError::OutputDir {
                path: job_dir.clone(),
                source,
            })?;
        }

        info!(
            job = %job_name,
            device = %request.device_id,
            pass = %request.pass.label(),
            "Running fio job"
        );

        let outcome = self
            .runner
            .run(&invocation)
            .map_err(|source| BenchmarkError::Spawn {
                job: job_name.clone(),
                source,
            })?;
        if !outcome.is_success() {
            return Err(BenchmarkError::FioFailed {
                job: job_name,
                code: outcome.code,
                stderr: outcome.stderr.trim().to_string(),
            });
        }

        let raw = if dry_run {
            None
        } else {
            read_results(&output_file)
        };

        Ok(BenchmarkRun {
            job_name,
            output_file,
            command: invocation.display(),
            raw,
        })
    }
}

/// fio may print warnings ahead of the JSON document, so parsing starts at the first `{`.
pub fn parse_results(content: &str) -> Option<serde_json::Value> {
    let start = content.find('{')?;
    serde_json::from_str(&content[start..]).ok()
}

fn read_results(path: &Path) -> Option<serde_json::Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "fio output file not readable");
            return None;
        }
    };
    let value = parse_results(&content);
    if value.is_none() {
        warn!(path = %path.display(), "fio output is not valid JSON");
    } else {
        debug!(path = %path.display(), "Parsed fio output");
    }
    value
}
