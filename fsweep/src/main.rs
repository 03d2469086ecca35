//! fsweep - fio sweep orchestrator
//!
//! Runs a grid of fio jobs against block devices, optionally through
//! dm-crypt mappings opened under different tuning profiles.

#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use fsweep::confirm::{self, Confirm};
use fsweep::{Orchestrator, VolumeManager, VolumeSettings, display, preflight, sweep};
use fsweep_common::{
    CommandRunner, DryRunRunner, LogConfig, LogFormat, Mode, Secret, SweepConfig, SweepPass,
    SystemRunner, TargetType, init_logging,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "fsweep")]
#[command(author, version, about = "fio parameter sweeps over plain and LUKS-encrypted devices")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (default: FSWEEP_LOG_FORMAT, else text)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Also write JSON logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full sweep
    Run {
        /// Configuration file (default: ./fsweep.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log every command instead of executing it
        #[arg(long)]
        dry_run: bool,

        /// Ask before destructive or ambiguous steps
        #[arg(long)]
        interactive: bool,

        /// Restrict to these passes (none, default, no-queues, submit-from-crypt-cpus, same-cpu-crypt)
        #[arg(long = "pass", value_name = "PASS")]
        passes: Vec<SweepPass>,
    },

    /// Print the generated job list for each pass
    Plan {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Close the encrypted mapping of a device
    Close {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Underlying device, e.g. /dev/nvme0n1
        #[arg(long)]
        device: PathBuf,

        /// Remove the detached header without asking
        #[arg(long)]
        remove_header: bool,

        /// Ask before removing the header
        #[arg(long)]
        interactive: bool,
    },

    /// Print the built-in configuration as TOML
    DefaultConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format.into());
    }
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_file(path);
    }
    let _logging_guards = init_logging(&log_config)?;

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            interactive,
            passes,
        } => {
            let mut config = load_config(config)?;
            config.dry_run |= dry_run;
            config.interactive |= interactive;
            if !passes.is_empty() {
                config.passes = passes;
            }
            // Nothing is written to the devices in a dry run.
            config.destructive |= config.dry_run;
            config.validate()?;
            run(config)
        }
        Commands::Plan { config, json } => {
            let mut config = load_config(config)?;
            config.destructive = true;
            config.validate()?;
            plan(&config, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Close {
            config,
            device,
            remove_header,
            interactive,
        } => {
            let config = load_config(config)?;
            close(&config, &device, remove_header, interactive)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::DefaultConfig => {
            print!("{}", SweepConfig::default().to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<SweepConfig> {
    let loaded = SweepConfig::load(path.as_deref())?;
    info!(source = %loaded.source, "Configuration loaded");
    if !loaded.env_overrides.is_empty() {
        debug!(vars = ?loaded.env_overrides, "Environment overrides");
    }
    Ok(loaded.config)
}

fn run(config: SweepConfig) -> Result<ExitCode> {
    if !config.dry_run {
        let problems = preflight::check(&config);
        if !problems.is_empty() {
            for problem in &problems {
                eprintln!("preflight: {problem}");
            }
            bail!("{} preflight check(s) failed", problems.len());
        }
    }

    let passphrase = if config.has_encrypted_passes() {
        config.resolve_passphrase()?.unwrap_or_default()
    } else {
        Secret::default()
    };
    let output_root = config.output_root_path()?;
    let confirm = confirm::policy(config.interactive);

    let writes = config.axes.modes.iter().any(Mode::writes);
    if writes && config.target_type == TargetType::Device && !config.dry_run {
        let devices: Vec<String> = config
            .targets
            .iter()
            .flat_map(|t| t.devices.iter().map(|d| d.display().to_string()))
            .collect();
        let question = format!(
            "Write benchmarks will destroy data on {}. Continue?",
            devices.join(", ")
        );
        if !confirm.confirm(&question, true) {
            info!("Sweep cancelled by operator");
            return Ok(ExitCode::FAILURE);
        }
    }

    let dry_runner = DryRunRunner::new();
    let runner: &dyn CommandRunner = if config.dry_run {
        &dry_runner
    } else {
        &SystemRunner
    };

    let orchestrator = Orchestrator::new(config, runner, confirm, passphrase, output_root);
    let report = orchestrator.run().context("sweep failed")?;

    println!("{}", display::summary(&report));
    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[derive(Serialize)]
struct PassPlan<'a> {
    target: String,
    pass: &'static str,
    output_dir: PathBuf,
    jobs: &'a [sweep::JobSpec],
}

fn plan(config: &SweepConfig, json: bool) -> Result<()> {
    let jobs = sweep::generate(&config.axes, config.runtime_secs);
    let root = config.output_root_path()?;

    let mut passes = config.passes.clone();
    passes.sort_by_key(SweepPass::is_encrypted);
    let per_pass: Vec<(SweepPass, Vec<sweep::JobSpec>)> = passes
        .iter()
        .map(|pass| (*pass, sweep::for_pass(&jobs, pass)))
        .collect();

    if json {
        let mut plans = Vec::new();
        for target in &config.targets {
            for (pass, jobs) in &per_pass {
                plans.push(PassPlan {
                    target: target.id(),
                    pass: pass.label(),
                    output_dir: fsweep::output::pass_dir(&root, pass),
                    jobs,
                });
            }
        }
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    for target in &config.targets {
        for (pass, jobs) in &per_pass {
            println!(
                "{}",
                display::pass_header(&target.id(), pass, jobs.len(), config.runtime_secs)
            );
            for job in jobs {
                println!("  {}", job.name);
            }
        }
    }
    Ok(())
}

fn close(
    config: &SweepConfig,
    device: &Path,
    remove_header: bool,
    interactive: bool,
) -> Result<()> {
    let mut settings = VolumeSettings::from_config(&config.encryption, Secret::default());
    settings.remove_header |= remove_header;
    let confirm: Box<dyn Confirm> = confirm::policy(interactive || config.interactive);
    let volumes = VolumeManager::new(SystemRunner, confirm, settings);

    if !volumes.is_open(device)? {
        info!(device = %device.display(), "No open mapping for device");
        return Ok(());
    }
    let outcome = volumes.close(device)?;
    println!(
        "closed {}{}",
        outcome.mapping,
        if outcome.header_removed {
            format!(", removed {}", outcome.header.display())
        } else {
            String::new()
        }
    );
    Ok(())
}
