//! Persisted session record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::worker::{RuntimeKind, Worker};

/// Registry entry describing one running worker.
///
/// Keyed in [`Sessions`] by the session name given at spawn time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Persona assigned to the worker.
    pub worker: String,
    /// First assigned task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Container name (also recorded for native workers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Spawn timestamp.
    pub spawned_at: DateTime<Utc>,
    /// Backend the worker runs under.
    pub runtime: RuntimeKind,
    /// Working directory of the worker.
    pub cwd: PathBuf,
    /// Tab title.
    pub display_name: String,
    /// Multiplexer session hosting the tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zellij_session: Option<String>,
    /// PID file of a native worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,
    /// Task-tracker root the worker's assignments live under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yak_path: Option<PathBuf>,
}

/// Session map keyed by session id.
pub type Sessions = BTreeMap<String, Session>;

impl Session {
    /// Registry view of a launched worker.
    #[must_use]
    pub fn from_worker(worker: &Worker) -> Self {
        Self {
            worker: worker.persona.clone(),
            task: worker.primary_task().map(str::to_owned),
            container: Some(worker.container_name.clone()),
            spawned_at: worker.spawned_at,
            runtime: worker.runtime,
            cwd: worker.cwd.clone(),
            display_name: worker.display_name.clone(),
            zellij_session: worker.multiplexer_session.clone(),
            pid_file: worker.pid_file.clone(),
            yak_path: Some(worker.yak_path.clone()),
        }
    }
}
