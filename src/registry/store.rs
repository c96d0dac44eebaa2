//! Session storage backends.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use super::lock::{FileLock, DEFAULT_LOCK_TIMEOUT};
use crate::models::session::Sessions;
use crate::{AppError, Result};

/// Mutation applied inside [`SessionStore::update`].
pub type SessionsMutation<'a> = &'a mut dyn FnMut(&mut Sessions) -> Result<()>;

/// Backend holding the session map.
///
/// `update` must be atomic with respect to other `update` calls on the
/// same backend: the load, the mutation, and the save happen under one
/// lock so concurrent writers cannot drop each other's changes.
pub trait SessionStore: Send + Sync {
    /// Read the whole map. A missing backing store is an empty map.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the stored data is unreadable.
    fn load(&self) -> Result<Sessions>;

    /// Replace the whole map.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the data cannot be written.
    fn save(&self, sessions: &Sessions) -> Result<()>;

    /// Load, apply `mutate`, and save as one locked transaction.
    ///
    /// Nothing is saved when `mutate` fails.
    ///
    /// # Errors
    ///
    /// Propagates lock, load, mutation, and save failures.
    fn update(&self, mutate: SessionsMutation<'_>) -> Result<()>;
}

/// JSON file backend (`.yak-boxes/sessions.json`).
///
/// Writes go to a temporary file in the same directory and are renamed
/// into place, so readers never observe a partial file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Backend stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<&Path> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| AppError::Registry("registry path has no parent directory".into()))?;
        fs::create_dir_all(parent).map_err(|err| {
            AppError::Registry(format!("failed to create {}: {err}", parent.display()))
        })?;
        Ok(parent)
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Sessions> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Sessions::new())
            }
            Err(err) => {
                return Err(AppError::Registry(format!(
                    "failed to read sessions file {}: {err}",
                    self.path.display()
                )))
            }
        };

        serde_json::from_str(&raw).map_err(|err| {
            AppError::Registry(format!(
                "failed to parse sessions file {}: {err}",
                self.path.display()
            ))
        })
    }

    fn save(&self, sessions: &Sessions) -> Result<()> {
        let parent = self.ensure_parent()?;
        let json = serde_json::to_string_pretty(sessions)?;

        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|err| AppError::Registry(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(json.as_bytes())
            .map_err(|err| AppError::Registry(format!("failed to write temporary file: {err}")))?;
        tmp.persist(&self.path).map_err(|err| {
            AppError::Registry(format!(
                "failed to persist sessions file {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }

    fn update(&self, mutate: SessionsMutation<'_>) -> Result<()> {
        self.ensure_parent()?;
        let _lock = FileLock::acquire(&self.path, DEFAULT_LOCK_TIMEOUT)?;
        let mut sessions = self.load()?;
        mutate(&mut sessions)?;
        self.save(&sessions)
    }
}

/// In-process backend, used where no workspace directory exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<Sessions>,
}

impl MemoryStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Sessions>> {
        self.sessions
            .lock()
            .map_err(|_| AppError::Registry("in-memory registry poisoned".into()))
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Sessions> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, sessions: &Sessions) -> Result<()> {
        *self.lock()? = sessions.clone();
        Ok(())
    }

    fn update(&self, mutate: SessionsMutation<'_>) -> Result<()> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        mutate(&mut working)?;
        *guard = working;
        Ok(())
    }
}
