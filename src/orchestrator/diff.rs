//! Diff: show what a persona changed in each repository of its home.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::Orchestrator;
use crate::path_safety::validate_component;
use crate::registry::SessionStore;
use crate::runtime::command::{run_succeeds, CommandRunner, CommandSpec};
use crate::{AppError, Result};

/// Branches tried, in order, as the base of a repository diff.
pub const BASE_BRANCH_CANDIDATES: [&str; 2] = ["main", "master"];

/// Changes of one repository in a persona home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDiff {
    /// Repository directory name.
    pub repo: String,
    /// Ref the diff is taken against.
    pub base: String,
    /// `git diff <base>...HEAD` output, or why it could not be produced.
    pub diff: std::result::Result<String, String>,
}

/// Every repository diff of one persona home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    /// Persona home that was inspected.
    pub home: PathBuf,
    /// One entry per repository, sorted by name.
    pub repos: Vec<RepoDiff>,
}

impl<S: SessionStore> Orchestrator<'_, S> {
    /// Diff every repository directly inside `persona`'s home against its
    /// default branch.
    ///
    /// A failed `git diff` is recorded on its repository entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` for a persona that is not a plain
    /// name, `AppError::NotFound` when the home does not exist and
    /// `AppError::Io` when it cannot be read.
    pub async fn diff(&self, persona: &str) -> Result<DiffReport> {
        let home = self.workspace.home_dir(validate_component(persona)?);
        if !home.is_dir() {
            return Err(AppError::NotFound(format!(
                "no home directory found for worker {persona:?} (expected {})",
                home.display()
            )));
        }

        let mut repos = Vec::new();
        for (repo, path) in own_repositories(&home)? {
            let base = default_branch(self.runner, &path).await;
            let spec = CommandSpec::new("git")
                .arg("-C")
                .path_arg(&path)
                .arg("diff")
                .arg(format!("{base}...HEAD"));
            let diff = match self.runner.run(&spec).await {
                Ok(output) if output.success() => Ok(output.stdout),
                Ok(output) => Err(output.stderr.trim().to_owned()),
                Err(err) => Err(err.to_string()),
            };
            if let Err(reason) = &diff {
                warn!(%repo, %reason, "git diff failed");
            }
            repos.push(RepoDiff { repo, base, diff });
        }
        Ok(DiffReport { home, repos })
    }
}

/// Subdirectories of `home` that own a `.git` entry themselves, sorted.
///
/// A plain subdirectory of an enclosing repository does not count.
fn own_repositories(home: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(home)
        .map_err(|err| AppError::Io(format!("failed to read {}: {err}", home.display())))?;
    let mut repos: Vec<(String, PathBuf)> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .filter(|(_, path)| path.join(".git").exists())
        .collect();
    repos.sort();
    Ok(repos)
}

/// First of `main`, `origin/main`, `master`, `origin/master` that
/// resolves in `repo`; `main` when none does.
pub async fn default_branch(runner: &dyn CommandRunner, repo: &Path) -> String {
    for candidate in BASE_BRANCH_CANDIDATES {
        for reference in [candidate.to_owned(), format!("origin/{candidate}")] {
            let probe = CommandSpec::new("git")
                .arg("-C")
                .path_arg(repo)
                .args(["rev-parse", "--verify", "--quiet"])
                .arg(&reference);
            if run_succeeds(runner, &probe).await {
                debug!(repo = %repo.display(), %reference, "diff base chosen");
                return reference;
            }
        }
    }
    BASE_BRANCH_CANDIDATES[0].to_owned()
}
