//! Worker description assembled during a single spawn.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Prefix shared by every worker container name.
pub const CONTAINER_NAME_PREFIX: &str = "yak-worker-";

/// Decoration placed between the persona and the session name in tab titles.
const DISPLAY_SEPARATOR: &str = "🪒🦬";

/// Execution backend a worker runs under.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Inside a container with resource limits and mount isolation.
    Sandboxed,
    /// Directly on the host inside a multiplexer tab.
    Native,
}

impl RuntimeKind {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sandboxed => "sandboxed",
            Self::Native => "native",
        }
    }
}

impl Display for RuntimeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime requested on the command line.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum)]
pub enum RuntimePreference {
    /// Probe the host and pick the first available backend.
    #[default]
    Auto,
    /// Force the container backend.
    Sandboxed,
    /// Force the host-process backend.
    Native,
}

impl RuntimePreference {
    /// The forced runtime, or `None` for `auto`.
    #[must_use]
    pub fn forced(self) -> Option<RuntimeKind> {
        match self {
            Self::Auto => None,
            Self::Sandboxed => Some(RuntimeKind::Sandboxed),
            Self::Native => Some(RuntimeKind::Native),
        }
    }
}

/// What the agent is asked to do with its tasks.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum)]
pub enum AgentMode {
    /// Scout and plan only.
    Plan,
    /// Implement the tasks.
    #[default]
    Build,
}

/// Agent CLI a worker runs.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AgentTool {
    /// Claude Code.
    #[default]
    Claude,
    /// OpenCode.
    Opencode,
    /// Cursor agent CLI.
    Cursor,
}

impl AgentTool {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Opencode => "opencode",
            Self::Cursor => "cursor",
        }
    }
}

impl Display for AgentTool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about a worker while it is being launched.
///
/// Constructed and discarded within one spawn; the persisted view is
/// [`Session`](crate::models::session::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    /// Session name given on the command line (`--name`).
    pub session_name: String,
    /// Persona identity allocated for this worker.
    pub persona: String,
    /// Tab title: persona plus the decorated session name.
    pub display_name: String,
    /// Container name derived from the session name.
    pub container_name: String,
    /// Backend the worker runs under.
    pub runtime: RuntimeKind,
    /// Absolute working directory (the worktree when one was created).
    pub cwd: PathBuf,
    /// Absolute task-tracker root.
    pub yak_path: PathBuf,
    /// Task paths assigned to the worker.
    pub tasks: Vec<String>,
    /// Spawn timestamp.
    pub spawned_at: DateTime<Utc>,
    /// Multiplexer session the tab is created in, if named.
    pub multiplexer_session: Option<String>,
    /// Worktree created for the first task, if any.
    pub worktree_path: Option<PathBuf>,
    /// PID file written by native wrappers.
    pub pid_file: Option<PathBuf>,
    /// Agent CLI.
    pub tool: AgentTool,
    /// Resolved model, if the tool takes one.
    pub model: Option<String>,
    /// Named agent profile discovered for the persona.
    pub agent_name: Option<String>,
}

impl Worker {
    /// First assigned task, if any.
    #[must_use]
    pub fn primary_task(&self) -> Option<&str> {
        self.tasks.first().map(String::as_str)
    }
}

/// Tab title for a worker: the persona alone, or decorated with the
/// trimmed session name when it is not blank.
#[must_use]
pub fn display_name(persona: &str, session_name: &str) -> String {
    let trimmed = session_name.trim();
    if trimmed.is_empty() {
        persona.to_owned()
    } else {
        format!("{persona} {DISPLAY_SEPARATOR} {trimmed}")
    }
}

/// Strip a session name down to container-safe characters.
///
/// Spaces become dashes; anything other than ASCII alphanumerics, `-` and
/// `_` is removed.
#[must_use]
pub fn sanitize_name(session_name: &str) -> String {
    session_name
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Container name for a session.
#[must_use]
pub fn container_name(session_name: &str) -> String {
    format!("{CONTAINER_NAME_PREFIX}{}", sanitize_name(session_name))
}
