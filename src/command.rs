//! External command port
//!
//! Everything that shells out goes through [`CommandRunner`] so tests can
//! script the export tool and the office suite instead of needing them installed.

use crate::error::{ReportError, ReportResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Replacement text for masked values.
pub const REDACTED: &str = "<redacted>";

/// Flags whose following argument is a secret.
pub const SECRET_FLAGS: [&str; 2] = ["--apiKeyId", "--apiKey"];

/// Stdout longer than this is summarised as head + tail.
pub const OUTPUT_SUMMARY_THRESHOLD: usize = 10;
const OUTPUT_SUMMARY_EDGE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program name for messages.
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Arguments with every value following a [`SECRET_FLAGS`] entry masked.
    pub fn masked_args(&self) -> Vec<String> {
        let mut masked = self.args.clone();
        for i in 0..masked.len() {
            if SECRET_FLAGS.contains(&masked[i].as_str()) && i + 1 < masked.len() {
                masked[i + 1] = REDACTED.to_string();
            }
        }
        masked
    }

    /// Single-line rendering safe to log.
    pub fn masked_command_line(&self) -> String {
        let mut parts = vec![self.program_name()];
        parts.extend(self.masked_args());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn status_text(&self) -> String {
        match self.status {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs a command to completion with captured output.
///
/// Returns `Err` only when the process could not be started; a non-zero exit
/// is reported through [`CommandOutput::status`].
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> ReportResult<CommandOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> ReportResult<CommandOutput> {
        (**self).run(spec)
    }
}

/// Blocking `std::process` runner. No timeout: a hung child hangs the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> ReportResult<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        let output = command.output().map_err(|source| ReportError::Spawn {
            program: spec.program_name(),
            source,
        })?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Probe for `program` on `PATH` via `which`.
pub fn program_available<R: CommandRunner>(runner: &R, program: &str) -> bool {
    if Path::new(program).is_absolute() {
        return Path::new(program).is_file();
    }
    match runner.run(&CommandSpec::new("which").arg(program)) {
        Ok(output) => output.success(),
        Err(_) => false,
    }
}

/// Masks known secret values inside arbitrary text.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl Redactor {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        // Longest first so a secret that contains another is masked whole
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        out
    }
}

/// Lines of `output` worth logging: everything when short, otherwise the
/// first and last five lines around a `...` marker.
pub fn summarize_output(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() <= OUTPUT_SUMMARY_THRESHOLD {
        return lines.into_iter().map(str::to_string).collect();
    }
    let mut summary: Vec<String> = lines[..OUTPUT_SUMMARY_EDGE]
        .iter()
        .map(|l| l.to_string())
        .collect();
    summary.push("...".to_string());
    summary.extend(
        lines[lines.len() - OUTPUT_SUMMARY_EDGE..]
            .iter()
            .map(|l| l.to_string()),
    );
    summary
}
