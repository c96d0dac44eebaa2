//! Path boundary validation.
//!
//! Keeps task directories, worktrees, and other derived paths inside the
//! directory they were derived from. Rejects `..` traversal and symlink
//! escapes.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Lexically normalize `path`: drop `.`, resolve `..` against preceding
/// components. Returns `None` when `..` climbs above the start.
#[must_use]
pub fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                normalized.push(component.as_os_str());
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Some(normalized)
}

/// Validate that `candidate` resides within `base_dir`.
///
/// Relative candidates are joined onto `base_dir`. Returns the resolved
/// absolute path (symlinks resolved when the path exists). The base
/// directory itself is accepted.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if either path is empty, if
/// `candidate` climbs out of `base_dir` with `..`, or if its resolved
/// location (following symlinks) lies outside `base_dir`.
pub fn validate_path(candidate: impl AsRef<Path>, base_dir: &Path) -> Result<PathBuf> {
    let candidate = candidate.as_ref();
    if candidate.as_os_str().is_empty() {
        return Err(AppError::PathViolation("path cannot be empty".into()));
    }
    if base_dir.as_os_str().is_empty() {
        return Err(AppError::PathViolation("base directory cannot be empty".into()));
    }

    let base = absolute(base_dir)?;
    let base = base.canonicalize().unwrap_or(base);

    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    let lexical = normalize(&joined).ok_or_else(|| {
        AppError::PathViolation(format!(
            "{} escapes {}",
            candidate.display(),
            base_dir.display()
        ))
    })?;

    let resolved = lexical.canonicalize().unwrap_or(lexical);
    if resolved.starts_with(&base) {
        Ok(resolved)
    } else {
        Err(AppError::PathViolation(format!(
            "{} is not within {}",
            candidate.display(),
            base_dir.display()
        )))
    }
}

/// Validate that `name` is usable as a single directory entry name.
///
/// # Errors
///
/// Returns `AppError::PathViolation` for blank names, `.` or `..`, and
/// names containing a path separator.
pub fn validate_component(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None)
            if part == name && !name.trim().is_empty() && !name.contains('\\') =>
        {
            Ok(name)
        }
        _ => Err(AppError::PathViolation(format!(
            "{name:?} is not a plain directory name"
        ))),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return normalize(path)
            .ok_or_else(|| AppError::PathViolation(format!("invalid path {}", path.display())));
    }
    let cwd = std::env::current_dir()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve current directory: {err}")))?;
    normalize(&cwd.join(path))
        .ok_or_else(|| AppError::PathViolation(format!("invalid path {}", path.display())))
}
