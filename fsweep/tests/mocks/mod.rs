//! Stateful stand-ins for the external tools.
//!
//! [`FakeTools`] models just enough of cryptsetup, dmsetup, fallocate and fio
//! for the volume lifecycle and the orchestrator to be exercised end to end:
//! headers become real files, formatted headers, open mappings and their
//! `--perf-*` flags are tracked in memory, and fio writes a small JSON
//! document to `--output`. Individual calls can be scripted to fail.

#![allow(dead_code)]

use fsweep::Confirm;
use fsweep_common::{CommandOutcome, CommandRunner, Invocation};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Mutex;

/// Arguments that take a value; their value is not positional.
const VALUE_FLAGS: &[&str] = &["--header", "--type", "-l"];

#[derive(Default)]
struct State {
    formatted: HashSet<String>,
    open: HashSet<String>,
    /// Active tuning flags per open mapping.
    flags: HashMap<String, Vec<String>>,
    issued: Vec<Invocation>,
    scripted: HashMap<String, VecDeque<CommandOutcome>>,
    /// Outcomes for the next call that also carries a given argument.
    scripted_for: Vec<(String, String, CommandOutcome)>,
}

#[derive(Default)]
pub struct FakeTools {
    state: Mutex<State>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next `program subcommand` call, e.g.
    /// `("cryptsetup", "isLuks")` or `("fio", "")`.
    pub fn script(&self, program: &str, subcommand: &str, outcome: CommandOutcome) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .entry(key(program, subcommand))
            .or_default()
            .push_back(outcome);
    }

    /// Like [`script`](Self::script), but only for a call that has `arg`
    /// among its arguments, e.g. one device of a multi-device target.
    pub fn script_for(&self, program: &str, subcommand: &str, arg: &str, outcome: CommandOutcome) {
        self.state.lock().unwrap().scripted_for.push((
            key(program, subcommand),
            arg.to_string(),
            outcome,
        ));
    }

    pub fn issued(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().issued.clone()
    }

    /// Issued calls as `program subcommand`, fio reduced to `fio`.
    pub fn calls(&self) -> Vec<String> {
        self.issued().iter().map(call_key).collect()
    }

    pub fn count(&self, program: &str, subcommand: &str) -> usize {
        let wanted = key(program, subcommand);
        self.calls().iter().filter(|c| **c == wanted).count()
    }

    pub fn is_open(&self, mapping: &str) -> bool {
        self.state.lock().unwrap().open.contains(mapping)
    }

    pub fn mark_open(&self, mapping: &str) {
        self.state.lock().unwrap().open.insert(mapping.to_string());
    }

    /// `--perf-*` flags the mapping was last opened or refreshed with.
    pub fn mapping_flags(&self, mapping: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .flags
            .get(mapping)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear_issued(&self) {
        self.state.lock().unwrap().issued.clear();
    }

    fn simulate(state: &mut State, invocation: &Invocation) -> io::Result<CommandOutcome> {
        let positional = positionals(invocation);
        let outcome = match (invocation.program.as_str(), positional.first().copied()) {
            ("fallocate", _) => {
                let path = positional.last().copied().unwrap_or_default();
                std::fs::write(path, b"")?;
                CommandOutcome::success()
            }
            ("cryptsetup", Some("isLuks")) => {
                if state.formatted.contains(positional[1]) {
                    CommandOutcome::success()
                } else {
                    CommandOutcome::with_code(1)
                }
            }
            ("cryptsetup", Some("luksFormat")) => {
                if invocation.stdin.is_none() {
                    return Ok(CommandOutcome::with_code(2).with_stderr("No key available"));
                }
                state.formatted.insert(flag_value(invocation, "--header"));
                CommandOutcome::success()
            }
            ("cryptsetup", Some("open")) => {
                let header = flag_value(invocation, "--header");
                if invocation.stdin.is_none() || !state.formatted.contains(&header) {
                    CommandOutcome::with_code(2).with_stderr("No key available with this passphrase.")
                } else {
                    state.open.insert(positional[2].to_string());
                    state
                        .flags
                        .insert(positional[2].to_string(), perf_flags(invocation));
                    CommandOutcome::success()
                }
            }
            ("cryptsetup", Some("refresh")) => {
                let mapping = positional[1];
                if invocation.stdin.is_none() {
                    CommandOutcome::with_code(2).with_stderr("No key available with this passphrase.")
                } else if !state.open.contains(mapping) {
                    CommandOutcome::with_code(4)
                        .with_stderr(format!("Device {mapping} is not active."))
                } else {
                    state.flags.insert(mapping.to_string(), perf_flags(invocation));
                    CommandOutcome::success()
                }
            }
            ("cryptsetup", Some("close")) => {
                if state.open.remove(positional[1]) {
                    state.flags.remove(positional[1]);
                    CommandOutcome::success()
                } else {
                    CommandOutcome::with_code(4)
                        .with_stderr(format!("Device {} is not active.", positional[1]))
                }
            }
            ("dmsetup", Some("info")) => {
                if state.open.contains(positional[1]) {
                    CommandOutcome::success()
                } else {
                    CommandOutcome::with_code(1)
                        .with_stderr(format!("Device {} not found", positional[1]))
                }
            }
            ("fio", _) => {
                let output = invocation
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("--output="))
                    .unwrap_or_default();
                let name = invocation
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("--name="))
                    .unwrap_or_default();
                std::fs::write(
                    output,
                    format!("{{\"fio version\": \"fio-3.36\", \"jobs\": [{{\"jobname\": \"{name}\"}}]}}"),
                )?;
                CommandOutcome::success()
            }
            _ => CommandOutcome::with_code(127).with_stderr("command not found"),
        };
        Ok(outcome)
    }
}

impl CommandRunner for FakeTools {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutcome> {
        let mut state = self.state.lock().unwrap();
        state.issued.push(invocation.clone());

        let call = call_key(invocation);
        if let Some(index) = state
            .scripted_for
            .iter()
            .position(|(k, arg, _)| *k == call && invocation.has_arg(arg))
        {
            return Ok(state.scripted_for.remove(index).2);
        }
        if let Some(outcome) = state.scripted.get_mut(&call).and_then(VecDeque::pop_front) {
            return Ok(outcome);
        }
        Self::simulate(&mut state, invocation)
    }
}

fn key(program: &str, subcommand: &str) -> String {
    if subcommand.is_empty() {
        program.to_string()
    } else {
        format!("{program} {subcommand}")
    }
}

fn call_key(invocation: &Invocation) -> String {
    match invocation.program.as_str() {
        "cryptsetup" | "dmsetup" => key(
            &invocation.program,
            positionals(invocation).first().copied().unwrap_or_default(),
        ),
        other => other.to_string(),
    }
}

fn positionals(invocation: &Invocation) -> Vec<&str> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in &invocation.args {
        if skip {
            skip = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip = true;
            continue;
        }
        if !arg.starts_with('-') {
            out.push(arg.as_str());
        }
    }
    out
}

fn perf_flags(invocation: &Invocation) -> Vec<String> {
    invocation
        .args
        .iter()
        .filter(|a| a.starts_with("--perf-"))
        .cloned()
        .collect()
}

fn flag_value(invocation: &Invocation, flag: &str) -> String {
    invocation
        .args
        .iter()
        .skip_while(|a| *a != flag)
        .nth(1)
        .cloned()
        .unwrap_or_default()
}

/// Replays scripted answers, then falls back to each question's default.
#[derive(Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<String>>,
    acknowledged: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str, default: bool) -> bool {
        self.questions.lock().unwrap().push(question.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or(default)
    }

    fn acknowledge(&self, message: &str) {
        self.acknowledged.lock().unwrap().push(message.to_string());
    }
}
