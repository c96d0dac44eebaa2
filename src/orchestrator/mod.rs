//! Worker lifecycle orchestration.
//!
//! [`Orchestrator::spawn`] launches a worker and records it;
//! [`Orchestrator::stop`] tears one down. Both collect secondary failures
//! as typed warnings instead of failing once the primary step is done.
//! `message`, `diff` and `check` are the operator-facing reads and pokes.

pub mod check;
pub mod diff;
pub mod message;
pub mod spawn;
pub mod stop;
pub mod tasks;

use crate::config::YakBoxConfig;
use crate::persona::PersonaAllocator;
use crate::registry::{JsonFileStore, SessionRegistry, SessionStore};
use crate::runtime::command::CommandRunner;
use crate::runtime::terminator::ProcessTreeTerminator;
use crate::workspace::Workspace;
use crate::worktree::WorktreeManager;

pub use check::{CheckReport, CheckRequest, StatusFilter};
pub use diff::DiffReport;
pub use message::{MessageReport, MessageRequest};
pub use spawn::SpawnRequest;
pub use stop::StopRequest;

/// Everything spawn and stop need, wired for one workspace.
pub struct Orchestrator<'a, S: SessionStore = JsonFileStore> {
    runner: &'a dyn CommandRunner,
    workspace: &'a Workspace,
    config: &'a YakBoxConfig,
    registry: SessionRegistry<S>,
    personas: PersonaAllocator,
    worktrees: WorktreeManager<'a>,
    terminator: ProcessTreeTerminator,
}

impl<'a> Orchestrator<'a, JsonFileStore> {
    /// Orchestrator over the workspace's own registry and persona cursor.
    #[must_use]
    pub fn for_workspace(
        runner: &'a dyn CommandRunner,
        workspace: &'a Workspace,
        config: &'a YakBoxConfig,
    ) -> Self {
        Self::with_registry(
            runner,
            workspace,
            config,
            SessionRegistry::for_workspace(workspace),
        )
    }
}

impl<'a, S: SessionStore> Orchestrator<'a, S> {
    /// Orchestrator recording sessions in `registry`.
    #[must_use]
    pub fn with_registry(
        runner: &'a dyn CommandRunner,
        workspace: &'a Workspace,
        config: &'a YakBoxConfig,
        registry: SessionRegistry<S>,
    ) -> Self {
        Self {
            runner,
            workspace,
            config,
            registry,
            personas: PersonaAllocator::for_workspace(config.personas.clone(), Some(workspace)),
            worktrees: WorktreeManager::new(runner),
            terminator: ProcessTreeTerminator::new(config.kill_poll_interval()),
        }
    }

    /// Replace the worktree manager.
    #[must_use]
    pub fn with_worktrees(mut self, worktrees: WorktreeManager<'a>) -> Self {
        self.worktrees = worktrees;
        self
    }

    /// Replace the process-tree terminator.
    #[must_use]
    pub fn with_terminator(mut self, terminator: ProcessTreeTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Session registry in use.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    /// Workspace being managed.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        self.workspace
    }
}
