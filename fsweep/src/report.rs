//! Machine-readable run summary.

use crate::luks::VolumeState;
use crate::output::REPORT_FILE;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub name: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    /// fio command line as issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Whether the output file held a JSON document. Unset in dry-run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_parsed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn completed(name: impl Into<String>, output_file: PathBuf) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Completed,
            output_file: Some(output_file),
            command: None,
            output_parsed: None,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Failed,
            output_file: None,
            command: None,
            output_parsed: None,
            error: Some(error.to_string()),
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Skipped,
            output_file: None,
            command: None,
            output_parsed: None,
            error: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    #[must_use]
    pub fn with_output_parsed(mut self, parsed: bool) -> Self {
        self.output_parsed = Some(parsed);
        self
    }
}

/// How an encrypted pass brought one device's mapping up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRecord {
    pub device: PathBuf,
    pub state: VolumeState,
    /// Set when an already-active mapping had its tuning flags reloaded.
    pub refreshed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub target: String,
    pub pass: String,
    pub output_dir: PathBuf,
    pub jobs: Vec<JobOutcome>,
    /// Mappings brought up for the pass; empty on plain passes.
    pub volumes: Vec<VolumeRecord>,
    /// Open/close failures, in order.
    pub volume_errors: Vec<String>,
    pub aborted: bool,
}

impl PassReport {
    pub fn new(target: impl Into<String>, pass: impl Into<String>, output_dir: PathBuf) -> Self {
        Self {
            target: target.into(),
            pass: pass.into(),
            output_dir,
            jobs: Vec::new(),
            volumes: Vec::new(),
            volume_errors: Vec::new(),
            aborted: false,
        }
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted
            && self.volume_errors.is_empty()
            && self.jobs.iter().all(|j| j.status == JobStatus::Completed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub passes: Vec<PassReport>,
    /// Set when `abort-all` stopped the run early.
    pub aborted: bool,
}

impl SweepReport {
    pub fn start(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            passes: Vec::new(),
            aborted: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.passes.iter().map(|p| p.count(status)).sum()
    }

    pub fn volume_error_count(&self) -> usize {
        self.passes.iter().map(|p| p.volume_errors.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.passes.iter().all(PassReport::is_success)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write `sweep-report.json` into `dir`, returning the file path.
    pub fn write_json(&self, dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        let json = self.to_json().map_err(io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
