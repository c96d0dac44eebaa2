//! Task-tracker helpers: locating task directories and the marker files
//! written into them.
//!
//! A task directory holding an `assigned-to` file is claimed by the persona
//! named in it; the task tracker reads that file to show who is working on
//! what.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::path_safety::validate_path;
use crate::{AppError, Result};

/// Marker naming the persona assigned to a task.
pub const ASSIGNED_TO_FILE: &str = "assigned-to";
/// Marker recording the worktree created for a task.
pub const WORKTREE_PATH_FILE: &str = "worktree-path";

/// Normalize a task path: spaces become dashes in every segment and empty
/// segments are dropped.
#[must_use]
pub fn slugify_task_path(task: &str) -> String {
    task.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace(' ', "-"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Result of a task directory search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMatch {
    /// Directory used.
    pub path: PathBuf,
    /// Further directories that matched and were passed over.
    pub also_matched: Vec<PathBuf>,
}

impl TaskMatch {
    /// Whether more than one directory matched.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        !self.also_matched.is_empty()
    }
}

/// Locate the directory for `slug` under `yak_path`.
///
/// The direct join `yak_path/slug` wins when it is a directory inside the
/// tracker. Otherwise the tree is walked in name order for directories
/// whose name equals the slug's last segment; the first is used.
///
/// # Errors
///
/// Returns `AppError::NotFound` containing "no directory matching" when
/// nothing matches.
pub fn find_task_dir(yak_path: &Path, slug: &str) -> Result<TaskMatch> {
    match validate_path(slug, yak_path) {
        Ok(resolved) if resolved.is_dir() => {
            return Ok(TaskMatch {
                path: yak_path.join(slug),
                also_matched: Vec::new(),
            });
        }
        Ok(_) => {}
        Err(err) => debug!(%err, slug, "direct task path rejected"),
    }

    let leaf = Path::new(slug)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut matches = Vec::new();
    if !leaf.is_empty() {
        collect_named_dirs(yak_path, &leaf, &mut matches);
    }

    let mut matches = matches.into_iter();
    match matches.next() {
        Some(path) => Ok(TaskMatch {
            path,
            also_matched: matches.collect(),
        }),
        None => Err(AppError::NotFound(format!(
            "no directory matching {slug:?} found under {}",
            yak_path.display()
        ))),
    }
}

fn collect_named_dirs(dir: &Path, name: &str, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut children: Vec<(String, PathBuf)> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .collect();
    children.sort();

    for (child_name, path) in children {
        if child_name == name {
            out.push(path.clone());
        }
        collect_named_dirs(&path, name, out);
    }
}

/// Walk up from `start` looking for a directory called `dir_name`.
///
/// # Errors
///
/// Returns `AppError::NotFound` with a hint to pass `--yak-path` when no
/// ancestor contains one.
pub fn find_yak_path(start: &Path, dir_name: &str) -> Result<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(dir_name);
        if candidate.is_dir() {
            return Ok(candidate);
        }
    }
    Err(AppError::NotFound(format!(
        "no {dir_name} directory found above {}. Suggestion: use --yak-path to specify it \
         explicitly",
        start.display()
    )))
}

/// Record `persona` as the owner of the task in `task_dir`.
///
/// # Errors
///
/// Returns `AppError::Io` if the marker cannot be written.
pub fn write_assignment(task_dir: &Path, persona: &str) -> Result<()> {
    write_marker(&task_dir.join(ASSIGNED_TO_FILE), persona)
}

/// Record the worktree created for the task in `task_dir`.
///
/// # Errors
///
/// Returns `AppError::Io` if the marker cannot be written.
pub fn write_worktree_marker(task_dir: &Path, worktree: &Path) -> Result<()> {
    write_marker(
        &task_dir.join(WORKTREE_PATH_FILE),
        &worktree.to_string_lossy(),
    )
}

fn write_marker(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)
        .map_err(|err| AppError::Io(format!("failed to write {}: {err}", path.display())))
}

/// Remove the `assigned-to` marker of `task`.
///
/// Returns whether a marker was removed. A task directory or marker that
/// does not exist is not an error.
///
/// # Errors
///
/// Returns `AppError::Io` if an existing marker cannot be removed.
pub fn clear_assignment(yak_path: &Path, task: &str) -> Result<bool> {
    let Ok(found) = find_task_dir(yak_path, &slugify_task_path(task)) else {
        return Ok(false);
    };
    let marker = found.path.join(ASSIGNED_TO_FILE);
    match fs::remove_file(&marker) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(AppError::Io(format!(
            "failed to remove {}: {err}",
            marker.display()
        ))),
    }
}
