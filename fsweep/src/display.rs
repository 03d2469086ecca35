//! Operator-facing console output.

use crate::report::{JobStatus, SweepReport};
use console::style;
use fsweep_common::SweepPass;

/// Format a duration in seconds as `45s`, `2m 5s`, `3h 20m`, `2d 4h`.
pub fn humanize_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Lower bound for a pass: every job runs for the full runtime.
pub fn estimated_secs(jobs: usize, runtime_secs: u64) -> u64 {
    (jobs as u64).saturating_mul(runtime_secs)
}

/// Banner printed before a pass starts.
pub fn pass_header(target: &str, pass: &SweepPass, jobs: usize, runtime_secs: u64) -> String {
    let pass_label = match pass.profile() {
        Some(profile) => format!("LUKS {profile}"),
        None => "no encryption".to_string(),
    };
    format!(
        "{} {} [{}]\n  {} jobs, ~{}",
        style("==>").cyan().bold(),
        style(target).bold(),
        style(pass_label).yellow(),
        jobs,
        humanize_duration(estimated_secs(jobs, runtime_secs))
    )
}

pub fn summary(report: &SweepReport) -> String {
    let completed = report.count(JobStatus::Completed);
    let failed = report.count(JobStatus::Failed);
    let skipped = report.count(JobStatus::Skipped);
    let volume_errors = report.volume_error_count();

    let verdict = if report.is_success() {
        style("sweep complete").green().bold()
    } else if report.aborted {
        style("sweep aborted").red().bold()
    } else {
        style("sweep finished with errors").yellow().bold()
    };

    let mut out = format!(
        "{verdict}: {completed} completed, {failed} failed, {skipped} skipped, {volume_errors} volume errors"
    );
    if report.dry_run {
        out.push_str(" (dry run)");
    }
    out
}
