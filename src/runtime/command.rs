//! Structured subprocess execution.
//!
//! Every external program (container engine, multiplexer, git) is invoked
//! from an explicit argument vector. The [`CommandRunner`] trait is the seam
//! tests use to replace real subprocesses with a recording fake.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

/// A program invocation described as an argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments passed verbatim, without shell interpretation.
    pub args: Vec<String>,
    /// Optional working directory.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Start building an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Run the program in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program followed by its arguments, as one vector.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Whether the arguments start with `prefix`.
    #[must_use]
    pub fn has_args_prefix(&self, prefix: &[&str]) -> bool {
        self.args.len() >= prefix.len() && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let argv = self.argv();
        let quoted = shlex::try_join(argv.iter().map(String::as_str))
            .unwrap_or_else(|_| argv.join(" "));
        f.write_str(&quoted)
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output carrying `stdout`.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and `stderr`.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Boxed future returned by [`CommandRunner::run`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>>;

/// Executes [`CommandSpec`]s.
///
/// `run` only fails when the program cannot be started; a non-zero exit is
/// reported through [`CommandOutput::code`].
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion and capture its output.
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> RunFuture<'a>;
}

/// [`CommandRunner`] backed by real `tokio` subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> RunFuture<'a> {
        Box::pin(async move {
            debug!(command = %spec, "running command");
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            if let Some(ref dir) = spec.cwd {
                cmd.current_dir(dir);
            }

            let output = cmd
                .output()
                .await
                .map_err(|err| AppError::Command(format!("failed to run {spec}: {err}")))?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Run `spec` and require a zero exit status.
///
/// # Errors
///
/// Returns `AppError::Command` if the program cannot be started or exits
/// unsuccessfully; the message includes the captured stderr.
pub async fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(spec).await?;
    if output.success() {
        return Ok(output);
    }

    let status = output
        .code
        .map_or_else(|| "signal".to_owned(), |c| c.to_string());
    let detail = output.stderr.trim();
    Err(AppError::Command(if detail.is_empty() {
        format!("`{spec}` exited with status {status}")
    } else {
        format!("`{spec}` exited with status {status}: {detail}")
    }))
}

/// Run `spec` and report only whether it exited successfully.
///
/// Start-up failures count as unsuccessful.
pub async fn run_succeeds(runner: &dyn CommandRunner, spec: &CommandSpec) -> bool {
    matches!(runner.run(spec).await, Ok(output) if output.success())
}

/// Non-empty, trimmed lines of `text`.
#[must_use]
pub fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
