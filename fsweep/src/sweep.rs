//! Parameter sweep generation.
//!
//! Expands the configured axes into the ordered list of fio jobs. Order is
//! mode → iodepth → numjobs → block size → mix, which keeps logs and output
//! trees reproducible between runs; names are pure functions of the
//! parameters, so identical parameters always produce identical names.

use fsweep_common::{Mode, SweepAxes, SweepPass};
use serde::Serialize;

/// One fully parameterized benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobSpec {
    pub name: String,
    pub mode: Mode,
    pub iodepth: u32,
    pub numjobs: u32,
    pub block_size: String,
    /// `rwmixread` percentage, only ever set for mixed modes.
    pub rwmix: Option<u8>,
    pub runtime_secs: u64,
}

impl JobSpec {
    pub fn new(
        mode: Mode,
        iodepth: u32,
        numjobs: u32,
        block_size: &str,
        rwmix: Option<u8>,
        runtime_secs: u64,
    ) -> Self {
        let rwmix = rwmix.filter(|_| mode.is_mixed());
        Self {
            name: job_name(mode, rwmix, iodepth, numjobs, block_size),
            mode,
            iodepth,
            numjobs,
            block_size: block_size.to_string(),
            rwmix,
            runtime_secs,
        }
    }

    /// Copy of this job named for `pass` (`_luks_<profile>` suffix when encrypted).
    #[must_use]
    pub fn for_pass(&self, pass: &SweepPass) -> Self {
        Self {
            name: format!("{}{}", self.name, pass.name_suffix()),
            ..self.clone()
        }
    }

    /// Directory level for the I/O pattern: `read`, `randrw`, `randrw70`.
    pub fn mode_dir(&self) -> String {
        match self.rwmix {
            Some(mix) => format!("{}{}", self.mode, mix),
            None => self.mode.to_string(),
        }
    }
}

/// `job-{mode}[_{mix}]_iod{iodepth}_numjobs{numjobs}_{bs}`
pub fn job_name(
    mode: Mode,
    rwmix: Option<u8>,
    iodepth: u32,
    numjobs: u32,
    block_size: &str,
) -> String {
    match rwmix {
        Some(mix) => format!("job-{mode}_{mix}_iod{iodepth}_numjobs{numjobs}_{block_size}"),
        None => format!("job-{mode}_iod{iodepth}_numjobs{numjobs}_{block_size}"),
    }
}

/// Expand `axes` into the full ordered job list.
///
/// Mixed modes get one job per mix value followed by a single mix-less job
/// when `mixed_baseline` is set. An empty axis yields an empty list.
pub fn generate(axes: &SweepAxes, runtime_secs: u64) -> Vec<JobSpec> {
    let mut jobs = Vec::with_capacity(expected_len(axes));

    for &mode in &axes.modes {
        for &iodepth in &axes.iodepths {
            for &numjobs in &axes.numjobs {
                for block_size in &axes.block_sizes {
                    if mode.is_mixed() {
                        for &mix in &axes.rwmixread {
                            jobs.push(JobSpec::new(
                                mode,
                                iodepth,
                                numjobs,
                                block_size,
                                Some(mix),
                                runtime_secs,
                            ));
                        }
                        if axes.mixed_baseline {
                            jobs.push(JobSpec::new(
                                mode,
                                iodepth,
                                numjobs,
                                block_size,
                                None,
                                runtime_secs,
                            ));
                        }
                    } else {
                        jobs.push(JobSpec::new(
                            mode,
                            iodepth,
                            numjobs,
                            block_size,
                            None,
                            runtime_secs,
                        ));
                    }
                }
            }
        }
    }

    jobs
}

/// Number of jobs [`generate`] returns for `axes`.
pub fn expected_len(axes: &SweepAxes) -> usize {
    let per_mode = axes.iodepths.len() * axes.numjobs.len() * axes.block_sizes.len();
    axes.modes
        .iter()
        .map(|mode| {
            if mode.is_mixed() {
                per_mode * (axes.rwmixread.len() + usize::from(axes.mixed_baseline))
            } else {
                per_mode
            }
        })
        .sum()
}

/// The job list renamed for one pass.
pub fn for_pass(jobs: &[JobSpec], pass: &SweepPass) -> Vec<JobSpec> {
    jobs.iter().map(|job| job.for_pass(pass)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsweep_common::EncryptionProfile;

    fn axes(modes: &[Mode], mix: &[u8]) -> SweepAxes {
        SweepAxes {
            modes: modes.to_vec(),
            iodepths: vec![1],
            numjobs: vec![1],
            block_sizes: vec!["4k".to_string()],
            rwmixread: mix.to_vec(),
            mixed_baseline: true,
        }
    }

    fn names(jobs: &[JobSpec]) -> Vec<&str> {
        jobs.iter().map(|j| j.name.as_str()).collect()
    }

    #[test]
    fn test_reference_example() {
        let jobs = generate(&axes(&[Mode::Read, Mode::RandRw], &[50]), 60);
        assert_eq!(
            names(&jobs),
            vec![
                "job-read_iod1_numjobs1_4k",
                "job-randrw_50_iod1_numjobs1_4k",
                "job-randrw_iod1_numjobs1_4k",
            ]
        );
        assert_eq!(jobs[1].rwmix, Some(50));
        assert_eq!(jobs[2].rwmix, None);
    }

    #[test]
    fn test_single_baseline_per_combination() {
        let jobs = generate(&axes(&[Mode::RandRw], &[50, 30, 70]), 60);
        assert_eq!(
            names(&jobs),
            vec![
                "job-randrw_50_iod1_numjobs1_4k",
                "job-randrw_30_iod1_numjobs1_4k",
                "job-randrw_70_iod1_numjobs1_4k",
                "job-randrw_iod1_numjobs1_4k",
            ]
        );
    }

    #[test]
    fn test_baseline_disabled() {
        let mut axes = axes(&[Mode::RandRw], &[50]);
        axes.mixed_baseline = false;
        let jobs = generate(&axes, 60);
        assert_eq!(names(&jobs), vec!["job-randrw_50_iod1_numjobs1_4k"]);
        assert_eq!(expected_len(&axes), 1);
    }

    #[test]
    fn test_mix_ignored_for_pure_modes() {
        let jobs = generate(&axes(&[Mode::Write], &[50, 70]), 60);
        assert_eq!(names(&jobs), vec!["job-write_iod1_numjobs1_4k"]);
        assert!(jobs[0].rwmix.is_none());
    }

    #[test]
    fn test_nested_order() {
        let axes = SweepAxes {
            modes: vec![Mode::Read],
            iodepths: vec![1, 8],
            numjobs: vec![1, 3],
            block_sizes: vec!["4k".to_string(), "4M".to_string()],
            rwmixread: vec![],
            mixed_baseline: true,
        };
        let jobs = generate(&axes, 60);
        assert_eq!(
            names(&jobs),
            vec![
                "job-read_iod1_numjobs1_4k",
                "job-read_iod1_numjobs1_4M",
                "job-read_iod1_numjobs3_4k",
                "job-read_iod1_numjobs3_4M",
                "job-read_iod8_numjobs1_4k",
                "job-read_iod8_numjobs1_4M",
                "job-read_iod8_numjobs3_4k",
                "job-read_iod8_numjobs3_4M",
            ]
        );
    }

    #[test]
    fn test_empty_axis_yields_nothing() {
        let mut axes = axes(&[Mode::Read], &[]);
        axes.iodepths.clear();
        assert!(generate(&axes, 60).is_empty());
        assert_eq!(expected_len(&axes), 0);
    }

    #[test]
    fn test_default_axes_cardinality() {
        // 3 iodepths * 3 numjobs * 4 block sizes = 36 per pure mode,
        // randrw adds 3 mixes + 1 baseline per combination.
        let axes = SweepAxes::default();
        assert_eq!(expected_len(&axes), 36 + 36 + 36 * 4);
        assert_eq!(generate(&axes, 60).len(), expected_len(&axes));
    }

    #[test]
    fn test_pass_suffix() {
        let jobs = generate(&axes(&[Mode::Read], &[]), 60);
        let plain = for_pass(&jobs, &SweepPass::Plain);
        assert_eq!(plain[0].name, "job-read_iod1_numjobs1_4k");

        let luks = for_pass(
            &jobs,
            &SweepPass::Encrypted(EncryptionProfile::SameCpuCrypt),
        );
        assert_eq!(luks[0].name, "job-read_iod1_numjobs1_4k_luks_same-cpu-crypt");
    }

    #[test]
    fn test_mode_dir() {
        let jobs = generate(&axes(&[Mode::RandRw], &[70]), 60);
        assert_eq!(jobs[0].mode_dir(), "randrw70");
        assert_eq!(jobs[1].mode_dir(), "randrw");
    }
}
