//! Advisory lockfile guarding read-modify-write of shared state files.
//!
//! `acquire()` creates `<target>.lock` with `O_CREAT | O_EXCL` and writes
//! the owner PID into it. Contenders retry until a deadline. A lockfile
//! whose owner PID is no longer alive, or one left empty for longer than
//! the wait timeout, is treated as stale and removed.
//! The lock is released when the guard is dropped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::runtime::terminator::process_alive;
use crate::{AppError, Result};

/// How long a contender waits before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Held advisory lock; released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Lockfile path guarding `target`.
    #[must_use]
    pub fn lock_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Acquire the lock guarding `target`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the lock is still held by a live
    /// process when the timeout expires, or on I/O failure.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self> {
        let path = Self::lock_path(target);
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id()).map_err(|err| {
                        AppError::Registry(format!(
                            "failed to write lockfile {}: {err}",
                            path.display()
                        ))
                    })?;
                    debug!(lock = %path.display(), "lock acquired");
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::remove_if_stale(&path, timeout) {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(AppError::Registry(format!(
                            "timed out waiting for lock {}. Suggestion: another yak-box \
                             command may be running; remove the file if it is stale",
                            path.display()
                        )));
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(err) => {
                    return Err(AppError::Registry(format!(
                        "failed to create lockfile {}: {err}",
                        path.display()
                    )))
                }
            }
        }
    }

    /// Remove the lockfile when its owner is gone. Returns whether the
    /// caller should retry creation immediately.
    ///
    /// The file is first renamed to a name unique to this caller, so two
    /// contenders cannot both delete it, and then checked again: a fresh
    /// lock renamed by mistake is linked back into place.
    fn remove_if_stale(path: &Path, stale_after: Duration) -> bool {
        match Self::staleness(path, stale_after) {
            Staleness::Gone => return true,
            Staleness::Held => return false,
            Staleness::Stale => {}
        }

        let claimed = Self::claim_path(path);
        match fs::rename(path, &claimed) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return true,
            Err(err) => {
                warn!(lock = %path.display(), %err, "failed to claim stale lockfile");
                return false;
            }
        }

        if Self::staleness(&claimed, stale_after) != Staleness::Stale {
            debug!(lock = %path.display(), "claimed a live lockfile, restoring it");
            if let Err(err) = fs::hard_link(&claimed, path) {
                warn!(lock = %path.display(), %err, "failed to restore lockfile");
            }
            let _ = fs::remove_file(&claimed);
            return false;
        }

        info!(lock = %path.display(), "removed stale lockfile");
        if let Err(err) = fs::remove_file(&claimed) {
            warn!(lock = %claimed.display(), %err, "failed to delete claimed lockfile");
        }
        true
    }

    fn staleness(path: &Path, stale_after: Duration) -> Staleness {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Staleness::Gone,
            Err(_) => return Staleness::Held,
        };

        match raw.trim().parse::<i32>() {
            Ok(owner) if process_alive(owner) => Staleness::Held,
            Ok(owner) => {
                debug!(lock = %path.display(), owner, "lock owner is gone");
                Staleness::Stale
            }
            // Empty until the owner writes its PID; only an old one is abandoned.
            Err(_) => {
                let age = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| SystemTime::now().duration_since(modified).ok());
                match age {
                    Some(age) if age >= stale_after => Staleness::Stale,
                    _ => Staleness::Held,
                }
            }
        }
    }

    fn claim_path(path: &Path) -> PathBuf {
        static CLAIMS: AtomicU64 = AtomicU64::new(0);
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(
            ".stale.{}.{}",
            std::process::id(),
            CLAIMS.fetch_add(1, Ordering::Relaxed)
        ));
        path.with_file_name(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Staleness {
    Gone,
    Held,
    Stale,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), %err, "failed to release lock");
        }
    }
}
