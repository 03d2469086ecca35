//! External tool invocation.
//!
//! Every external command is described as a program plus an explicit
//! argument list. Secrets are fed through stdin and never appear in the
//! argument list, so an [`Invocation`] can always be logged verbatim.

use crate::types::Secret;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info};

/// A single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Secret>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Pipe a secret to the child's stdin.
    #[must_use]
    pub fn stdin_secret(mut self, secret: &Secret) -> Self {
        self.stdin = Some(secret.clone());
        self
    }

    /// First positional argument (the tool subcommand for cryptsetup/dmsetup).
    pub fn subcommand(&self) -> Option<&str> {
        self.args
            .iter()
            .find(|a| !a.starts_with('-'))
            .map(String::as_str)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Command line for logs. Stdin content is never rendered.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.contains(char::is_whitespace) {
                out.push('\'');
                out.push_str(arg);
                out.push('\'');
            } else {
                out.push_str(arg);
            }
        }
        if self.stdin.is_some() {
            out.push_str(" <stdin:***>");
        }
        out
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success() -> Self {
        Self::with_code(0)
    }

    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands to completion.
///
/// Implementations block until the child exits; the sweep is strictly
/// sequential.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutcome>;

    /// Dry runners log instead of executing; callers skip filesystem side
    /// effects that only make sense after a real run.
    fn is_dry_run(&self) -> bool {
        false
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutcome> {
        (**self).run(invocation)
    }

    fn is_dry_run(&self) -> bool {
        (**self).is_dry_run()
    }
}

/// Spawns real processes with captured stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutcome> {
        debug!(command = %invocation.display(), "Spawning");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(secret) = &invocation.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin.write_all(secret.expose().as_bytes())?;
            // Dropping stdin closes the pipe so the child sees EOF.
        }

        let output = child.wait_with_output()?;
        let outcome = CommandOutcome {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            program = %invocation.program,
            code = ?outcome.code,
            "Process exited"
        );
        Ok(outcome)
    }
}

/// Logs every invocation and reports success without spawning anything.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    issued: Mutex<Vec<Invocation>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations that would have been executed, in order.
    pub fn issued(&self) -> Vec<Invocation> {
        self.issued
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for DryRunRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutcome> {
        info!(command = %invocation.display(), "[dry-run] would run");
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(invocation.clone());
        }
        Ok(CommandOutcome::success())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display_hides_stdin() {
        let inv = Invocation::new("cryptsetup")
            .args(["-q", "open", "/dev/nvme0n1", "encrypted-nvme0n1"])
            .stdin_secret(&Secret::new("hunter2"));
        let shown = inv.display();
        assert_eq!(
            shown,
            "cryptsetup -q open /dev/nvme0n1 encrypted-nvme0n1 <stdin:***>"
        );
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_invocation_subcommand_skips_flags() {
        let inv = Invocation::new("cryptsetup").args(["-q", "luksFormat", "--batch-mode"]);
        assert_eq!(inv.subcommand(), Some("luksFormat"));
        assert!(inv.has_arg("--batch-mode"));
        assert!(!inv.has_arg("--header"));
    }

    #[test]
    fn test_invocation_display_quotes_whitespace() {
        let inv = Invocation::new("echo").arg("two words");
        assert_eq!(inv.display(), "echo 'two words'");
    }

    #[test]
    fn test_outcome_success() {
        assert!(CommandOutcome::success().is_success());
        assert!(!CommandOutcome::with_code(1).is_success());
        assert!(!CommandOutcome::default().is_success());
    }

    #[test]
    fn test_dry_run_records_without_spawning() {
        let runner = DryRunRunner::new();
        let inv = Invocation::new("definitely-not-a-real-binary").arg("--flag");
        let outcome = runner.run(&inv).unwrap();
        assert!(outcome.is_success());
        assert!(runner.is_dry_run());
        assert_eq!(runner.issued(), vec![inv]);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_streams() {
        let outcome = SystemRunner
            .run(&Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(outcome.code, Some(3));
        assert_eq!(outcome.stdout.trim(), "out");
        assert_eq!(outcome.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_feeds_stdin() {
        let outcome = SystemRunner
            .run(&Invocation::new("cat").stdin_secret(&Secret::new("passphrase")))
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "passphrase");
    }

    #[test]
    fn test_system_runner_missing_binary_is_error() {
        let result = SystemRunner.run(&Invocation::new("fsweep-no-such-tool-xyz"));
        assert!(result.is_err());
    }
}
