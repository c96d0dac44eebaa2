//! Git worktrees giving each task its own checkout.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::runtime::command::{run_checked, run_succeeds, CommandRunner, CommandSpec};
use crate::{AppError, Result};

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    /// Checkout directory.
    pub path: PathBuf,
    /// Checked-out branch, without `refs/heads/`.
    pub branch: Option<String>,
}

/// Parse `git worktree list --porcelain` output.
#[must_use]
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.push(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(branch) = line.strip_prefix("branch ") {
            if let Some(entry) = entries.last_mut() {
                let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
                entry.branch = Some(branch.to_owned());
            }
        }
    }
    entries
}

/// Branch name for a task path: `/` becomes `-`.
#[must_use]
pub fn branch_name(task: &str) -> String {
    task.replace('/', "-")
}

/// Directory name for a task's worktree.
#[must_use]
pub fn sanitize_task_path(task: &str) -> String {
    task.replace(['/', ':', ' '], "-")
}

/// Creates and finds per-task worktrees.
pub struct WorktreeManager<'a> {
    runner: &'a dyn CommandRunner,
    data_home: Option<PathBuf>,
}

impl<'a> WorktreeManager<'a> {
    /// Manager placing worktrees under the user data directory
    /// (`$XDG_DATA_HOME` or `~/.local/share`).
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            data_home: dirs::data_dir(),
        }
    }

    /// Manager placing worktrees under `data_home`.
    #[must_use]
    pub fn with_data_home(runner: &'a dyn CommandRunner, data_home: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            data_home: Some(data_home.into()),
        }
    }

    /// Where a new worktree for `task` is created:
    /// `<data>/yak-box/worktrees/<project>/<task>`, or a sibling of the
    /// project when no data directory is known.
    #[must_use]
    pub fn worktree_path(&self, project: &Path, task: &str) -> PathBuf {
        let project_name = project
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sanitized = sanitize_task_path(task);

        match &self.data_home {
            Some(data) => data
                .join("yak-box")
                .join("worktrees")
                .join(project_name)
                .join(sanitized),
            None => project
                .parent()
                .unwrap_or(project)
                .join(format!("{project_name}-{sanitized}")),
        }
    }

    fn git(project: &Path) -> CommandSpec {
        CommandSpec::new("git").arg("-C").path_arg(project)
    }

    /// Worktrees registered in `project`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worktree` if git cannot list them.
    pub async fn list(&self, project: &Path) -> Result<Vec<WorktreeEntry>> {
        let spec = Self::git(project).args(["worktree", "list", "--porcelain"]);
        let output = run_checked(self.runner, &spec)
            .await
            .map_err(|err| AppError::Worktree(format!("failed to list worktrees: {err}")))?;
        Ok(parse_worktree_list(&output.stdout))
    }

    /// Return the worktree for `task`, creating it if needed.
    ///
    /// An existing worktree on the task's branch is reused. Otherwise one is
    /// added, checking out the branch when it exists or creating it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worktree` if `project` is not a git repository or
    /// git fails.
    pub async fn ensure(&self, project: &Path, task: &str) -> Result<PathBuf> {
        let probe = Self::git(project).args(["rev-parse", "--git-dir"]);
        if !run_succeeds(self.runner, &probe).await {
            return Err(AppError::Worktree(format!(
                "not a git repository: {}",
                project.display()
            )));
        }

        let branch = branch_name(task);
        if let Some(existing) = self
            .list(project)
            .await?
            .into_iter()
            .find(|entry| entry.branch.as_deref() == Some(branch.as_str()))
        {
            info!(path = %existing.path.display(), branch, "reusing worktree");
            return Ok(existing.path);
        }

        let path = self.worktree_path(project, task);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Worktree(format!("failed to create {}: {err}", parent.display()))
            })?;
        }

        let branch_ref = format!("refs/heads/{branch}");
        let branch_exists = run_succeeds(
            self.runner,
            &Self::git(project).args(["show-ref", "--verify", "--quiet", branch_ref.as_str()]),
        )
        .await;

        let mut add = Self::git(project).args(["worktree", "add"]).path_arg(&path);
        add = if branch_exists {
            add.arg(branch.as_str())
        } else {
            add.args(["-b", branch.as_str()])
        };
        run_checked(self.runner, &add)
            .await
            .map_err(|err| AppError::Worktree(format!("failed to create worktree: {err}")))?;

        info!(path = %path.display(), branch, created_branch = !branch_exists, "worktree created");
        Ok(path)
    }
}
