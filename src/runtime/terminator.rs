//! PID-file driven process-tree termination for native workers.
//!
//! The native wrapper writes its own PID right before `exec`, so the PID
//! file names the long-running agent process. Termination signals the
//! whole process group so language servers and other children die too.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{AppError, Result};

/// Default liveness poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a process may linger after SIGKILL before it is reported as
/// surviving.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// How a termination completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process was already gone.
    AlreadyExited,
    /// The process exited after SIGTERM within the timeout.
    Terminated,
    /// The process had to be killed with SIGKILL.
    Killed,
}

/// Signal-escalating terminator.
#[derive(Debug, Clone, Copy)]
pub struct ProcessTreeTerminator {
    poll_interval: Duration,
    kill_grace: Duration,
}

impl Default for ProcessTreeTerminator {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ProcessTreeTerminator {
    /// Terminator polling liveness every `poll_interval`.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Override the post-SIGKILL grace window.
    #[must_use]
    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    /// Terminate the process named by `pid_file` and its process group.
    ///
    /// Sends SIGTERM, polls until `timeout`, then escalates to SIGKILL.
    /// The PID file is removed on every successful path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the PID file cannot be read,
    /// `AppError::Process` if it does not hold a valid PID, or if the
    /// process is still alive after SIGKILL and the grace window (the PID
    /// file is kept in that case).
    pub async fn kill(&self, pid_file: &Path, timeout: Duration) -> Result<Termination> {
        let pid = read_pid_file(pid_file)?;
        let span = info_span!("terminate_process_tree", pid, pid_file = %pid_file.display());
        self.kill_pid(pid, pid_file, timeout).instrument(span).await
    }

    async fn kill_pid(&self, pid: i32, pid_file: &Path, timeout: Duration) -> Result<Termination> {
        if !process_alive(pid) {
            debug!("process already exited");
            remove_pid_file(pid_file);
            return Ok(Termination::AlreadyExited);
        }

        let group = process_group(pid);
        signal_tree(pid, group, Signal::Term);

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !process_alive(pid) {
                info!("process exited after SIGTERM");
                remove_pid_file(pid_file);
                return Ok(Termination::Terminated);
            }
            sleep(self.poll_interval).await;
        }

        warn!(timeout_ms = timeout.as_millis(), "process ignored SIGTERM, sending SIGKILL");
        signal_tree(pid, group, Signal::Kill);

        let grace_deadline = Instant::now() + self.kill_grace;
        loop {
            if !process_alive(pid) {
                info!("process killed");
                remove_pid_file(pid_file);
                return Ok(Termination::Killed);
            }
            if Instant::now() >= grace_deadline {
                break;
            }
            sleep(self.poll_interval).await;
        }

        Err(AppError::Process(format!(
            "process {pid} survived SIGKILL. Suggestion: it may be stuck in uninterruptible I/O; \
             check `ps -o stat= -p {pid}`"
        )))
    }
}

/// Parse the PID stored in `pid_file`.
///
/// # Errors
///
/// Returns `AppError::Io` on read failure and `AppError::Process` when the
/// content is not a positive integer.
pub fn read_pid_file(pid_file: &Path) -> Result<i32> {
    let raw = fs::read_to_string(pid_file).map_err(|err| {
        AppError::Io(format!("failed to read pid file {}: {err}", pid_file.display()))
    })?;

    match raw.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(AppError::Process(format!(
            "invalid pid in {}: {:?}",
            pid_file.display(),
            raw.trim()
        ))),
    }
}

fn remove_pid_file(pid_file: &Path) {
    match fs::remove_file(pid_file) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(%err, pid_file = %pid_file.display(), "failed to remove pid file"),
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Whether `pid` names a live, non-zombie process.
#[cfg(unix)]
#[must_use]
pub fn process_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid <= 0 {
        return false;
    }

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => !is_zombie(pid),
        // Exists but owned by someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Whether `pid` names a live process.
#[cfg(not(unix))]
#[must_use]
pub fn process_alive(_pid: i32) -> bool {
    false
}

/// Exited processes awaiting reaping still answer signal 0.
#[cfg(unix)]
fn is_zombie(pid: i32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

/// Process group of `pid`, or `pid` itself when lookup fails.
#[cfg(unix)]
fn process_group(pid: i32) -> i32 {
    use nix::unistd::{getpgid, Pid};

    getpgid(Some(Pid::from_raw(pid))).map_or(pid, Pid::as_raw)
}

#[cfg(not(unix))]
fn process_group(pid: i32) -> i32 {
    pid
}

/// Signal the group, falling back to the single process. Never signals
/// our own process group.
#[cfg(unix)]
fn signal_tree(pid: i32, group: i32, signal: Signal) {
    use nix::sys::signal::{kill, killpg, Signal as NixSignal};
    use nix::unistd::{getpgrp, Pid};

    let signal = match signal {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };

    if group != getpgrp().as_raw() {
        match killpg(Pid::from_raw(group), signal) {
            Ok(()) => return,
            Err(err) => debug!(group, %err, "group signal failed, signalling process"),
        }
    }

    if let Err(err) = kill(Pid::from_raw(pid), signal) {
        debug!(pid, %err, "signal failed");
    }
}

#[cfg(not(unix))]
fn signal_tree(pid: i32, _group: i32, _signal: Signal) {
    warn!(pid, "process signals are not supported on this platform");
}
