//! Result directory layout.
//!
//! ```text
//! {root}[_luks_{profile}]/{device_id}/{mode}[{mix}]/{bs}/{job}.json
//! ```

use crate::sweep::JobSpec;
use fsweep_common::SweepPass;
use std::io;
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "sweep-report.json";

/// Root directory for one pass: `root` itself for plain, `root_luks_{profile}` otherwise.
pub fn pass_dir(root: &Path, pass: &SweepPass) -> PathBuf {
    match pass.profile() {
        None => root.to_path_buf(),
        Some(profile) => {
            let mut name = root.as_os_str().to_os_string();
            name.push(format!("_luks_{profile}"));
            PathBuf::from(name)
        }
    }
}

pub fn job_dir(pass_dir: &Path, device_id: &str, job: &JobSpec) -> PathBuf {
    pass_dir
        .join(device_id)
        .join(job.mode_dir())
        .join(&job.block_size)
}

pub fn job_output_file(job_dir: &Path, job: &JobSpec) -> PathBuf {
    job_dir.join(format!("{}.json", job.name))
}

pub fn ensure_dir(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}
