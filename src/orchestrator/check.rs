//! Check: one read-only snapshot of sessions, persona homes, task status
//! and worker containers.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info_span, warn, Instrument};

use super::Orchestrator;
use crate::models::session::Sessions;
use crate::opencode::container_cost;
use crate::path_safety::validate_path;
use crate::registry::SessionStore;
use crate::runtime::container::{ContainerEngine, ContainerStatus};
use crate::Result;

/// File a worker writes its current task status into.
pub const AGENT_STATUS_FILE: &str = "agent-status";

/// Status prefixes `check` can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Statuses starting with `blocked`.
    Blocked,
    /// Statuses starting with `wip`.
    Wip,
}

impl StatusFilter {
    /// Status prefix this filter selects.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Wip => "wip",
        }
    }
}

/// Inputs to a check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckRequest {
    /// Only report tasks whose status starts with this filter's prefix.
    pub status: Option<StatusFilter>,
    /// Only report tasks under this path of the task tracker.
    pub prefix: Option<String>,
}

/// `agent-status` of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    /// Task path relative to the tracker root, `/`-separated.
    pub task: String,
    /// Trimmed status text.
    pub status: String,
}

impl TaskStatus {
    /// Whether the status matches `filter`.
    #[must_use]
    pub fn is(&self, filter: StatusFilter) -> bool {
        self.status.starts_with(filter.prefix())
    }
}

/// Disk usage of a persona home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeUsage {
    /// Persona owning the home.
    pub persona: String,
    /// Total size of regular files, symlinks not followed.
    pub bytes: u64,
}

/// A running worker container and the cost its agent reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningWorker {
    /// Engine status.
    pub container: ContainerStatus,
    /// Last field of the agent's `Total Cost` line, when available.
    pub cost: Option<String>,
}

/// Everything `check` gathered. Sources that could not be read leave
/// their section empty and add a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Registered sessions.
    pub sessions: Sessions,
    /// Persona homes with their size.
    pub homes: Vec<HomeUsage>,
    /// Directory task statuses were read from.
    pub task_root: PathBuf,
    /// Matching task statuses, sorted by task; `None` when `task_root`
    /// does not exist.
    pub tasks: Option<Vec<TaskStatus>>,
    /// Running worker containers.
    pub running: Vec<RunningWorker>,
    /// Exited worker containers awaiting `stop`.
    pub stopped: Vec<ContainerStatus>,
    /// Sources that could not be read.
    pub notes: Vec<String>,
}

impl<S: SessionStore> Orchestrator<'_, S> {
    /// Gather a status snapshot of the workspace.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` when `request.prefix` leaves the
    /// task tracker. Every other failure becomes a note on the report.
    pub async fn check(&self, request: &CheckRequest) -> Result<CheckReport> {
        let span = info_span!("check", prefix = ?request.prefix, status = ?request.status);
        self.check_inner(request).instrument(span).await
    }

    async fn check_inner(&self, request: &CheckRequest) -> Result<CheckReport> {
        let tracker = self.workspace.root().join(&self.config.task_dir_name);
        let task_root = match request.prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(prefix) => {
                validate_path(prefix, &tracker)?;
                tracker.join(prefix)
            }
            None => tracker.clone(),
        };

        let mut report = CheckReport {
            task_root: task_root.clone(),
            ..CheckReport::default()
        };

        match self.registry.list() {
            Ok(sessions) => report.sessions = sessions,
            Err(err) => report.notes.push(format!("could not load sessions: {err}")),
        }

        match self.workspace.list_homes() {
            Ok(homes) => {
                report.homes = homes
                    .into_iter()
                    .map(|persona| HomeUsage {
                        bytes: tree_size(&self.workspace.home_dir(&persona)),
                        persona,
                    })
                    .collect();
            }
            Err(err) => report.notes.push(format!("could not list homes: {err}")),
        }

        if task_root.is_dir() {
            let mut tasks = Vec::new();
            collect_statuses(&tracker, &task_root, &mut tasks);
            if let Some(filter) = request.status {
                tasks.retain(|task| task.is(filter));
            }
            tasks.sort_by(|a, b| a.task.cmp(&b.task));
            report.tasks = Some(tasks);
        }

        let engine = ContainerEngine::new(self.runner, &self.config.container_engine);
        match engine.worker_statuses(false).await {
            Ok(running) => {
                for container in running {
                    let cost = container_cost(
                        self.runner,
                        &self.config.container_engine,
                        &container.name,
                    )
                    .await;
                    report.running.push(RunningWorker { container, cost });
                }
            }
            Err(err) => {
                warn!(%err, "could not list running workers");
                report.notes.push(format!("could not list running workers: {err}"));
            }
        }
        match engine.worker_statuses(true).await {
            Ok(stopped) => report.stopped = stopped,
            Err(err) => report.notes.push(format!("could not list stopped workers: {err}")),
        }

        debug!(
            tasks = report.tasks.as_ref().map_or(0, Vec::len),
            running = report.running.len(),
            stopped = report.stopped.len(),
            "check complete"
        );
        Ok(report)
    }
}

fn collect_statuses(tracker: &Path, dir: &Path, out: &mut Vec<TaskStatus>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_statuses(tracker, &path, out);
        } else if entry.file_name() == AGENT_STATUS_FILE {
            let Ok(status) = fs::read_to_string(&path) else {
                continue;
            };
            let task = dir
                .strip_prefix(tracker)
                .unwrap_or(dir)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(TaskStatus {
                task,
                status: status.trim().to_owned(),
            });
        }
    }
}

fn tree_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(std::result::Result::ok)
        .map(|entry| match entry.path().symlink_metadata() {
            Ok(meta) if meta.is_dir() => tree_size(&entry.path()),
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        })
        .sum()
}
