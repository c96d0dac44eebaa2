//! Typed partial-failure results for spawn and stop.
//!
//! Secondary bookkeeping failures do not fail the command once the worker
//! is running (or gone). They are collected here so callers and tests can
//! inspect them instead of scraping log output.

use std::fmt::{Display, Formatter};

use tracing::warn;

use crate::models::worker::{RuntimeKind, Worker};

/// Step that produced a non-fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningStage {
    /// A model override was ignored for the selected tool.
    ModelIgnored,
    /// The devcontainer configuration weakens isolation.
    DevcontainerSecurity,
    /// More than one task directory matched a slug.
    AmbiguousTask,
    /// Session registration after launch.
    Registration,
    /// Writing a task's `assigned-to` file.
    TaskAssignment,
    /// Writing a task's `worktree-path` marker.
    WorktreeMarker,
    /// Removing a task's `assigned-to` file.
    AssignmentCleanup,
    /// Closing the multiplexer tab.
    TabClose,
    /// Stopping or removing the container.
    ContainerStop,
    /// Terminating the native process tree.
    ProcessKill,
    /// Removing the session from the registry.
    Unregister,
}

impl WarningStage {
    /// Short label used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelIgnored => "model_ignored",
            Self::DevcontainerSecurity => "devcontainer_security",
            Self::AmbiguousTask => "ambiguous_task",
            Self::Registration => "registration",
            Self::TaskAssignment => "task_assignment",
            Self::WorktreeMarker => "worktree_marker",
            Self::AssignmentCleanup => "assignment_cleanup",
            Self::TabClose => "tab_close",
            Self::ContainerStop => "container_stop",
            Self::ProcessKill => "process_kill",
            Self::Unregister => "unregister",
        }
    }
}

/// A failure that was reported but did not abort the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Step that failed.
    pub stage: WarningStage,
    /// Human-readable detail.
    pub message: String,
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage.as_str(), self.message)
    }
}

/// Ordered collection of warnings; each push is also logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    /// Record and log a warning.
    pub fn push(&mut self, stage: WarningStage, message: impl Into<String>) {
        let message = message.into();
        warn!(stage = stage.as_str(), "{message}");
        self.0.push(Warning { stage, message });
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Recorded warnings in order.
    #[must_use]
    pub fn as_slice(&self) -> &[Warning] {
        &self.0
    }

    /// Whether any warning came from `stage`.
    #[must_use]
    pub fn contains_stage(&self, stage: WarningStage) -> bool {
        self.0.iter().any(|w| w.stage == stage)
    }
}

/// Result of a successful spawn.
#[derive(Debug, Clone)]
pub struct SpawnReport {
    /// The launched worker.
    pub worker: Worker,
    /// Non-fatal bookkeeping failures.
    pub warnings: Warnings,
}

/// Result of a stop that did not hit a fatal error.
#[derive(Debug, Clone)]
pub struct StopReport {
    /// Session that was stopped.
    pub session_name: String,
    /// Runtime of the stopped worker.
    pub runtime: RuntimeKind,
    /// Whether the run only described its actions.
    pub dry_run: bool,
    /// Actions taken, or planned in a dry run.
    pub actions: Vec<String>,
    /// Non-fatal teardown failures.
    pub warnings: Warnings,
}
