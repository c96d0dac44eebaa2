//! Round-robin persona allocation.
//!
//! The cursor file holds the index of the next persona to hand out. It is
//! read and rewritten under the registry's advisory lock so concurrent
//! spawns in one workspace get different personas.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::registry::lock::{FileLock, DEFAULT_LOCK_TIMEOUT};
use crate::workspace::Workspace;

/// Hands out persona names from a fixed pool.
#[derive(Debug, Clone)]
pub struct PersonaAllocator {
    personas: Vec<String>,
    cursor: Option<PathBuf>,
}

impl PersonaAllocator {
    /// Allocator persisting its cursor at `cursor`.
    ///
    /// With no cursor path, every pick is uniformly random.
    #[must_use]
    pub fn new(personas: Vec<String>, cursor: Option<PathBuf>) -> Self {
        Self { personas, cursor }
    }

    /// Allocator using the workspace's `.last-persona` cursor, or random
    /// selection when no workspace is available.
    #[must_use]
    pub fn for_workspace(personas: Vec<String>, workspace: Option<&Workspace>) -> Self {
        Self::new(personas, workspace.map(Workspace::persona_cursor_path))
    }

    /// Persona pool in allocation order.
    #[must_use]
    pub fn personas(&self) -> &[String] {
        &self.personas
    }

    /// Pick the next persona.
    ///
    /// Returns the persona at the stored index (an unreadable or
    /// out-of-range cursor counts as `0`) and advances the cursor. Falls
    /// back to a random pick when the cursor directory cannot be created.
    /// Returns an empty string only for an empty pool.
    #[must_use]
    pub fn pick(&self) -> String {
        if self.personas.is_empty() {
            return String::new();
        }

        let Some(cursor) = self.cursor.as_deref() else {
            return self.pick_random();
        };

        let Some(parent) = cursor.parent() else {
            return self.pick_random();
        };
        if let Err(err) = fs::create_dir_all(parent) {
            debug!(%err, "persona cursor directory unavailable, picking at random");
            return self.pick_random();
        }

        let _lock = match FileLock::acquire(cursor, DEFAULT_LOCK_TIMEOUT) {
            Ok(lock) => Some(lock),
            Err(err) => {
                warn!(%err, "persona cursor lock unavailable, continuing unlocked");
                None
            }
        };

        let idx = self.read_cursor(cursor);
        let next = (idx + 1) % self.personas.len();
        if let Err(err) = write_cursor(cursor, next) {
            warn!(%err, cursor = %cursor.display(), "failed to persist persona cursor");
        }

        self.personas[idx].clone()
    }

    fn pick_random(&self) -> String {
        let idx = rand::thread_rng().gen_range(0..self.personas.len());
        self.personas[idx].clone()
    }

    fn read_cursor(&self, cursor: &Path) -> usize {
        fs::read_to_string(cursor)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|idx| *idx < self.personas.len())
            .unwrap_or(0)
    }
}

fn write_cursor(cursor: &Path, next: usize) -> std::io::Result<()> {
    let dir = cursor.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    write!(tmp, "{next}")?;
    tmp.persist(cursor).map_err(|err| err.error)?;
    Ok(())
}
