//! Talking to the opencode agent running inside a worker.
//!
//! Sandboxed workers are reached with `<engine> exec <container> opencode ...`;
//! native workers with a local `opencode ... --dir <cwd>`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::session::Session;
use crate::models::worker::RuntimeKind;
use crate::runtime::command::{CommandRunner, CommandSpec};
use crate::{AppError, Result};

/// Agent binary inside the worker.
pub const OPENCODE_BINARY: &str = "opencode";

/// One entry of `opencode session list --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpencodeSession {
    /// Session id, e.g. `ses_abc123`.
    pub id: String,
    /// Title the agent gave the conversation.
    #[serde(default)]
    pub title: String,
    /// Last update, milliseconds since the epoch.
    #[serde(default)]
    pub updated: i64,
    /// Creation time, milliseconds since the epoch.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub project_id: String,
    /// Directory the session was started in.
    #[serde(default)]
    pub directory: String,
}

/// Output format requested from `opencode run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    /// The agent's plain text reply.
    #[default]
    Default,
    /// Machine-readable event stream.
    Json,
}

/// What `opencode run` produced for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageResult {
    /// Combined stdout and stderr.
    pub output: String,
    /// Exit status of the agent command.
    pub exit_code: i32,
}

/// Client for the opencode agent of one registered worker.
pub struct OpencodeClient<'a> {
    runner: &'a dyn CommandRunner,
    engine: &'a str,
    session: &'a Session,
}

impl<'a> OpencodeClient<'a> {
    /// Client for the worker recorded in `session`, using `engine` to exec
    /// into sandboxed containers.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, engine: &'a str, session: &'a Session) -> Self {
        Self {
            runner,
            engine,
            session,
        }
    }

    fn command(&self) -> Result<CommandSpec> {
        match self.session.runtime {
            RuntimeKind::Sandboxed => {
                let container = self.session.container.as_deref().ok_or_else(|| {
                    AppError::Runtime("sandboxed session has no container recorded".into())
                })?;
                Ok(CommandSpec::new(self.engine).args(["exec", container, OPENCODE_BINARY]))
            }
            RuntimeKind::Native => Ok(CommandSpec::new(OPENCODE_BINARY)),
        }
    }

    fn with_native_dir(&self, spec: CommandSpec) -> CommandSpec {
        let native = self.session.runtime == RuntimeKind::Native;
        if native && !self.session.cwd.as_os_str().is_empty() {
            spec.arg("--dir").path_arg(&self.session.cwd)
        } else {
            spec
        }
    }

    /// List the worker's opencode sessions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` if the listing fails or its output
    /// holds no parsable JSON array.
    pub async fn sessions(&self) -> Result<Vec<OpencodeSession>> {
        let list = self.command()?.args(["session", "list", "--format", "json"]);
        let spec = self.with_native_dir(list);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(AppError::Runtime(format!(
                "failed to list opencode sessions: {}{}",
                output.stdout.trim(),
                output.stderr.trim()
            )));
        }
        parse_sessions(&output.stdout)
    }

    /// Send `text` to opencode session `session_id`.
    ///
    /// A non-zero agent exit is reported in [`MessageResult::exit_code`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Command` if the agent command cannot be started.
    pub async fn send(
        &self,
        session_id: &str,
        text: &str,
        format: MessageFormat,
    ) -> Result<MessageResult> {
        let run = self.command()?.args(["run", "--session", session_id]);
        let mut spec = self.with_native_dir(run);
        if format == MessageFormat::Json {
            spec = spec.args(["--format", "json"]);
        }
        let output = self.runner.run(&spec.arg(text)).await?;
        debug!(session_id, code = ?output.code, "message sent");
        Ok(MessageResult {
            exit_code: output.code.unwrap_or(-1),
            output: output.stdout + &output.stderr,
        })
    }
}

/// Parse `opencode session list --format json` output.
///
/// Plugin chatter printed before the JSON array is skipped, including
/// bracketed prefixes such as `[rtk]`.
///
/// # Errors
///
/// Returns `AppError::Runtime` when no JSON array can be parsed.
pub fn parse_sessions(output: &str) -> Result<Vec<OpencodeSession>> {
    let trimmed = output.trim();
    let mut last_err = None;
    for (start, _) in trimmed.match_indices('[') {
        match serde_json::from_str(&trimmed[start..]) {
            Ok(sessions) => return Ok(sessions),
            Err(err) => last_err = Some(err),
        }
    }
    Err(AppError::Runtime(match last_err {
        Some(err) => format!("failed to parse opencode sessions: {err}"),
        None => format!("no JSON array found in opencode output: {trimmed}"),
    }))
}

/// Most recently updated session; the first one wins ties.
#[must_use]
pub fn most_recent(sessions: &[OpencodeSession]) -> Option<&OpencodeSession> {
    sessions
        .iter()
        .reduce(|best, s| if s.updated > best.updated { s } else { best })
}

/// Total cost reported by `opencode stats`: the last field of its
/// `Total Cost` line.
#[must_use]
pub fn parse_total_cost(stats: &str) -> Option<String> {
    stats
        .lines()
        .filter(|line| line.contains("Total Cost"))
        .find_map(|line| line.split_whitespace().last())
        .map(str::to_owned)
}

/// Live cost of the opencode agent in `container`, if it reports one.
pub async fn container_cost(
    runner: &dyn CommandRunner,
    engine: &str,
    container: &str,
) -> Option<String> {
    let spec = CommandSpec::new(engine).args(["exec", container, OPENCODE_BINARY, "stats"]);
    match runner.run(&spec).await {
        Ok(output) if output.success() => parse_total_cost(&output.stdout),
        _ => None,
    }
}
