//! Drives targets through passes: open volumes, run the sweep, close volumes.

use crate::confirm::Confirm;
use crate::display;
use crate::fio::{BenchmarkRequest, FioRunner, FioSettings};
use crate::luks::{VolumeError, VolumeManager, VolumeSettings, VolumeState};
use crate::output;
use crate::report::{JobOutcome, JobStatus, PassReport, SweepReport, VolumeRecord};
use crate::sweep::{self, JobSpec};
use fsweep_common::{
    CommandRunner, DeviceTarget, EncryptionProfile, FailurePolicy, Secret, SweepConfig, SweepPass,
};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("encrypted passes are configured but no LUKS passphrase was provided")]
    MissingPassphrase,

    #[error("failed to write sweep report to {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct Orchestrator<R, C> {
    config: SweepConfig,
    runner: R,
    confirm: C,
    passphrase: Secret,
    output_root: PathBuf,
}

impl<R: CommandRunner, C: Confirm> Orchestrator<R, C> {
    pub fn new(
        config: SweepConfig,
        runner: R,
        confirm: C,
        passphrase: Secret,
        output_root: PathBuf,
    ) -> Self {
        Self {
            config,
            runner,
            confirm,
            passphrase,
            output_root,
        }
    }

    /// Passes in execution order: plain first, then encrypted in configured order.
    pub fn ordered_passes(&self) -> Vec<SweepPass> {
        let mut passes = self.config.passes.clone();
        passes.sort_by_key(SweepPass::is_encrypted);
        passes
    }

    /// Run every target through every pass.
    ///
    /// Job and volume failures land in the report; only setup problems and
    /// report persistence return `Err`.
    pub fn run(&self) -> Result<SweepReport, SweepError> {
        let dry_run = self.runner.is_dry_run();
        if self.config.has_encrypted_passes() && self.passphrase.is_empty() && !dry_run {
            return Err(SweepError::MissingPassphrase);
        }

        let fio = FioRunner::new(&self.runner, FioSettings::from_config(&self.config));
        let volumes = VolumeManager::new(
            &self.runner,
            &self.confirm,
            VolumeSettings::from_config(&self.config.encryption, self.passphrase.clone()),
        );
        let jobs = sweep::generate(&self.config.axes, self.config.runtime_secs);
        let passes = self.ordered_passes();

        info!(
            targets = self.config.targets.len(),
            passes = passes.len(),
            jobs_per_pass = jobs.len(),
            policy = %self.config.on_failure,
            dry_run,
            "Starting sweep"
        );

        let mut report = SweepReport::start(dry_run);
        'targets: for target in &self.config.targets {
            for pass in &passes {
                let pass_report = self.run_pass(&fio, &volumes, target, pass, &jobs);
                let stop = pass_report.aborted && self.config.on_failure == FailurePolicy::AbortAll;
                report.passes.push(pass_report);
                if stop {
                    warn!(target_id = %target.id(), pass = %pass.label(), "Aborting remaining sweep");
                    report.aborted = true;
                    break 'targets;
                }
            }
        }
        report.finish();

        if !dry_run {
            let path = report
                .write_json(&self.output_root)
                .map_err(|source| SweepError::Report {
                    path: self.output_root.join(output::REPORT_FILE),
                    source,
                })?;
            info!(path = %path.display(), "Wrote sweep report");
        }

        Ok(report)
    }

    fn run_pass<F: CommandRunner, V: CommandRunner, P: Confirm>(
        &self,
        fio: &FioRunner<F>,
        volumes: &VolumeManager<V, P>,
        target: &DeviceTarget,
        pass: &SweepPass,
        jobs: &[JobSpec],
    ) -> PassReport {
        let target_id = target.id();
        let pass_dir = output::pass_dir(&self.output_root, pass);
        let pass_jobs = sweep::for_pass(jobs, pass);
        let mut report = PassReport::new(&target_id, pass.label(), pass_dir.clone());
        let policy = self.config.on_failure;

        println!(
            "{}",
            display::pass_header(&target_id, pass, pass_jobs.len(), self.config.runtime_secs)
        );

        let dry_run = self.runner.is_dry_run();
        let filenames = match pass.profile() {
            None => target.devices.clone(),
            Some(profile) => match open_all(volumes, target, profile) {
                Ok(records) => {
                    report.volumes = records;
                    target
                        .devices
                        .iter()
                        .map(|d| volumes.mapping_path(d))
                        .collect()
                }
                Err(e) => {
                    error!(target_id = %target_id, profile = %profile, error = %e, "Could not open encrypted volumes");
                    report.volume_errors.push(e.to_string());
                    report.aborted = policy != FailurePolicy::Continue;
                    report.jobs = pass_jobs
                        .iter()
                        .map(|job| JobOutcome::skipped(&job.name, "encrypted volume not open"))
                        .collect();
                    return report;
                }
            },
        };

        for job in &pass_jobs {
            if report.aborted {
                report
                    .jobs
                    .push(JobOutcome::skipped(&job.name, "pass aborted"));
                continue;
            }

            let request = BenchmarkRequest {
                job,
                filenames: &filenames,
                device_id: &target_id,
                pass,
                pass_dir: &pass_dir,
            };
            match fio.run(&request) {
                Ok(run) => {
                    let mut outcome = JobOutcome::completed(run.job_name, run.output_file)
                        .with_command(run.command);
                    if !dry_run {
                        outcome = outcome.with_output_parsed(run.raw.is_some());
                    }
                    report.jobs.push(outcome);
                }
                Err(e) => {
                    error!(job = %job.name, target_id = %target_id, error = %e, "Benchmark failed");
                    report.jobs.push(JobOutcome::failed(&job.name, &e));
                    if policy != FailurePolicy::Continue {
                        report.aborted = true;
                    }
                }
            }
        }

        for record in &report.volumes {
            if let Err(e) = volumes.close(&record.device) {
                error!(device = %record.device.display(), error = %e, "Could not close encrypted volume");
                report.volume_errors.push(e.to_string());
                if policy == FailurePolicy::AbortAll {
                    report.aborted = true;
                }
            }
        }

        info!(
            target_id = %target_id,
            pass = %pass.label(),
            completed = report.count(JobStatus::Completed),
            failed = report.count(JobStatus::Failed),
            aborted = report.aborted,
            "Pass finished"
        );
        report
    }
}

/// Bring every device of `target` up under `profile`; on failure close the
/// ones already up.
///
/// A mapping that was left active (e.g. by a failed close in an earlier
/// pass) is refreshed so the pass never measures another profile's flags.
fn open_all<V: CommandRunner, P: Confirm>(
    volumes: &VolumeManager<V, P>,
    target: &DeviceTarget,
    profile: EncryptionProfile,
) -> Result<Vec<VolumeRecord>, VolumeError> {
    let mut records: Vec<VolumeRecord> = Vec::with_capacity(target.devices.len());
    for device in &target.devices {
        let result = volumes.ensure_open(device, profile).and_then(|state| {
            let refreshed = state == VolumeState::AlreadyOpen;
            if refreshed {
                warn!(
                    device = %device.display(),
                    profile = %profile,
                    "Mapping was still active, reloading its tuning flags"
                );
                volumes.refresh(device, profile)?;
            }
            Ok(VolumeRecord {
                device: device.clone(),
                state,
                refreshed,
            })
        });
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                for done in &records {
                    if let Err(close_err) = volumes.close(&done.device) {
                        warn!(device = %done.device.display(), error = %close_err, "Rollback close failed");
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AutoConfirm;
    use fsweep_common::{DryRunRunner, Mode, SweepAxes};

    fn small_config() -> SweepConfig {
        SweepConfig {
            axes: SweepAxes {
                modes: vec![Mode::Read, Mode::RandRw],
                iodepths: vec![1],
                numjobs: vec![1],
                block_sizes: vec!["4k".to_string()],
                rwmixread: vec![50],
                mixed_baseline: true,
            },
            passes: vec![
                SweepPass::Encrypted(EncryptionProfile::Default),
                SweepPass::Plain,
            ],
            ..SweepConfig::default()
        }
    }

    #[test]
    fn test_plain_pass_runs_first() {
        let orchestrator = Orchestrator::new(
            small_config(),
            DryRunRunner::new(),
            AutoConfirm,
            Secret::default(),
            PathBuf::from("/out"),
        );
        assert_eq!(
            orchestrator.ordered_passes(),
            vec![
                SweepPass::Plain,
                SweepPass::Encrypted(EncryptionProfile::Default)
            ]
        );
    }

    #[test]
    fn test_missing_passphrase_outside_dry_run() {
        struct Live;
        impl CommandRunner for Live {
            fn run(&self, _: &fsweep_common::Invocation) -> io::Result<fsweep_common::CommandOutcome> {
                Ok(fsweep_common::CommandOutcome::success())
            }
        }
        let orchestrator = Orchestrator::new(
            small_config(),
            Live,
            AutoConfirm,
            Secret::default(),
            PathBuf::from("/out"),
        );
        assert!(matches!(
            orchestrator.run(),
            Err(SweepError::MissingPassphrase)
        ));
    }

    #[test]
    fn test_dry_run_covers_every_job() {
        let runner = DryRunRunner::new();
        let orchestrator = Orchestrator::new(
            small_config(),
            &runner,
            AutoConfirm,
            Secret::default(),
            PathBuf::from("/nonexistent/fsweep-out"),
        );
        let report = orchestrator.run().unwrap();
        assert!(report.dry_run);
        assert!(report.is_success());
        assert_eq!(report.passes.len(), 2);
        assert_eq!(report.passes[0].pass, "none");
        assert_eq!(report.passes[1].pass, "default");
        assert_eq!(
            report.passes[1].jobs[1].name,
            "job-randrw_50_iod1_numjobs1_4k_luks_default"
        );
        assert!(!PathBuf::from("/nonexistent/fsweep-out").exists());
        let job = &report.passes[1].jobs[0];
        assert!(job.command.as_deref().unwrap().contains("/dev/mapper/encrypted-"));
        assert_eq!(job.output_parsed, None);
        assert_eq!(report.passes[1].volumes[0].state, VolumeState::Formatted);

        let fio_calls = runner
            .issued()
            .iter()
            .filter(|i| i.program == "fio")
            .count();
        assert_eq!(fio_calls, 6);
    }
}
