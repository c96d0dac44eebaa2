//! Spawn: resolve everything a worker needs, launch it, record it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, info_span, Instrument};

use super::tasks::{
    find_task_dir, find_yak_path, slugify_task_path, write_assignment, write_worktree_marker,
};
use super::Orchestrator;
use crate::devcontainer::{audit, DevcontainerConfig, SubstitutionContext};
use crate::models::report::{SpawnReport, WarningStage, Warnings};
use crate::models::session::Session;
use crate::models::worker::{
    container_name, display_name, AgentMode, AgentTool, RuntimeKind, RuntimePreference, Worker,
};
use crate::prompt::{self, DEFAULT_INSTRUCTION};
use crate::registry::SessionStore;
use crate::runtime::agent::{discover_agent_profile, resolve_model};
use crate::runtime::container::ContainerEngine;
use crate::runtime::detect::{detect, Detected};
use crate::runtime::profile::{resolve, ResourceProfile};
use crate::runtime::{native, sandboxed};
use crate::{AppError, Result};

/// Inputs to a spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Working directory of the worker.
    pub cwd: PathBuf,
    /// Session name; keys the registry and decorates the tab title.
    pub session_name: String,
    /// Multiplexer session to open the tab in.
    pub multiplexer_session: Option<String>,
    /// Plan or build.
    pub mode: AgentMode,
    /// Resource profile name.
    pub resources: String,
    /// Task paths to assign.
    pub tasks: Vec<String>,
    /// Explicit task-tracker root; discovered from `cwd` when absent.
    pub yak_path: Option<PathBuf>,
    /// Requested runtime.
    pub runtime: RuntimePreference,
    /// Agent CLI for native workers.
    pub tool: AgentTool,
    /// Model override.
    pub model: Option<String>,
    /// Free-text instruction appended to the prompt.
    pub instruction: Option<String>,
    /// Wipe the persona home before launching.
    pub clean_home: bool,
    /// Run the worker in a per-task git worktree.
    pub auto_worktree: bool,
}

fn absolute(path: &Path, what: &str, flag: &str) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|err| {
        AppError::Io(format!(
            "failed to resolve {what} {}: {err}. Suggestion: ensure {flag} is valid and accessible",
            path.display()
        ))
    })
}

impl<S: SessionStore> Orchestrator<'_, S> {
    async fn resolve_runtime(&self, preference: RuntimePreference) -> Result<RuntimeKind> {
        if let Some(forced) = preference.forced() {
            return Ok(forced);
        }
        match detect(self.runner, self.config).await {
            Detected::Available(kind) => {
                info!(runtime = %kind, "runtime detected");
                Ok(kind)
            }
            Detected::Unknown => Err(AppError::Runtime(format!(
                "no runtime available ({} or {}). Suggestion: install {} and start its daemon, \
                 or install {}; force one with --runtime=sandboxed or --runtime=native",
                self.config.container_engine,
                self.config.multiplexer,
                self.config.container_engine,
                self.config.multiplexer
            ))),
        }
    }

    /// Launch a worker and register its session.
    ///
    /// Once the worker's tab exists, registration and task bookkeeping
    /// failures are returned as warnings in the report.
    ///
    /// # Errors
    ///
    /// Returns an error if no runtime is available, the task tracker or
    /// working directory cannot be resolved, a worktree cannot be created,
    /// the persona home cannot be prepared, the devcontainer configuration
    /// is invalid, the worker image cannot be ensured, or the launch fails.
    pub async fn spawn(&self, request: &SpawnRequest) -> Result<SpawnReport> {
        let span = info_span!("spawn", session = %request.session_name);
        self.spawn_inner(request).instrument(span).await
    }

    async fn spawn_inner(&self, request: &SpawnRequest) -> Result<SpawnReport> {
        let mut warnings = Warnings::default();

        let runtime = self.resolve_runtime(request.runtime).await?;

        let mut cwd = absolute(&request.cwd, "working directory", "--cwd")?;
        let yak_path = match &request.yak_path {
            Some(explicit) => absolute(explicit, "task tracker path", "--yak-path")?,
            None => find_yak_path(&cwd, &self.config.task_dir_name)?,
        };

        let mut worktree_path = None;
        if request.auto_worktree {
            if let Some(task) = request.tasks.first() {
                let worktree = self.worktrees.ensure(&cwd, task).await.map_err(|err| {
                    AppError::Worktree(format!(
                        "{err}. Suggestion: run inside a git repository with write access, or \
                         drop --auto-worktree"
                    ))
                })?;
                info!(worktree = %worktree.display(), "using worktree");
                cwd.clone_from(&worktree);
                worktree_path = Some(worktree);
            }
        }

        let persona = self.personas.pick();
        if request.clean_home {
            self.workspace.clean_home(&persona)?;
        }
        let home_dir = self.workspace.ensure_home_dir(&persona)?;

        let devcontainer = DevcontainerConfig::load(&cwd)?;
        if let Some(config) = &devcontainer {
            for finding in audit(config) {
                warnings.push(WarningStage::DevcontainerSecurity, finding.message);
            }
        }

        let profile = resolve(&request.resources);
        let instruction = request
            .instruction
            .as_deref()
            .filter(|i| !i.trim().is_empty())
            .unwrap_or(DEFAULT_INSTRUCTION);
        let prompt_text = prompt::build(request.mode, &yak_path, instruction, &request.tasks);

        let agent_name = discover_agent_profile(request.tool, &cwd, &persona);
        let model = resolve_model(request.tool, request.model.as_deref());
        if model.ignored_override {
            warnings.push(
                WarningStage::ModelIgnored,
                format!("--model is ignored for --tool {}", request.tool),
            );
        }

        let mut worker = Worker {
            session_name: request.session_name.clone(),
            display_name: display_name(&persona, &request.session_name),
            container_name: container_name(&request.session_name),
            persona,
            runtime,
            cwd,
            yak_path,
            tasks: request.tasks.clone(),
            spawned_at: Utc::now(),
            multiplexer_session: request.multiplexer_session.clone(),
            worktree_path,
            pid_file: None,
            tool: request.tool,
            model: model.model,
            agent_name,
        };

        let scripts_dir = self.workspace.scripts_dir(&worker.persona);
        match runtime {
            RuntimeKind::Sandboxed => {
                self.launch_sandboxed(
                    &worker,
                    &prompt_text,
                    &profile,
                    &home_dir,
                    &scripts_dir,
                    devcontainer.as_ref(),
                )
                .await?;
            }
            RuntimeKind::Native => {
                let artifacts =
                    native::launch(self.runner, self.config, &worker, &prompt_text, &scripts_dir)
                        .await
                        .map_err(|err| {
                            AppError::Runtime(format!(
                                "failed to spawn native worker: {err}. Suggestion: ensure {} \
                                 is installed and running, or use --runtime=sandboxed",
                                self.config.multiplexer
                            ))
                        })?;
                worker.pid_file = Some(artifacts.pid_file);
            }
        }

        if let Err(err) = self
            .registry
            .register(&worker.session_name, Session::from_worker(&worker))
        {
            warnings.push(
                WarningStage::Registration,
                format!("failed to register session: {err}"),
            );
        }

        self.assign_tasks(&worker, &mut warnings);

        info!(
            persona = %worker.persona,
            runtime = %worker.runtime,
            warnings = warnings.as_slice().len(),
            "worker spawned"
        );
        Ok(SpawnReport { worker, warnings })
    }

    async fn launch_sandboxed(
        &self,
        worker: &Worker,
        prompt_text: &str,
        profile: &ResourceProfile,
        home_dir: &Path,
        scripts_dir: &Path,
        devcontainer: Option<&DevcontainerConfig>,
    ) -> Result<()> {
        let native_hint = "Suggestion: check the container engine is running, or retry with \
                           --runtime=native";

        if devcontainer.and_then(DevcontainerConfig::image).is_none() {
            let status = ContainerEngine::new(self.runner, &self.config.container_engine)
                .ensure_image(&self.config.default_image, self.workspace.root())
                .await
                .map_err(|err| {
                    AppError::Runtime(format!("failed to ensure worker image: {err}. {native_hint}"))
                })?;
            info!(image = %self.config.default_image, ?status, "worker image ready");
        }

        let env: Vec<(String, String)> = match devcontainer {
            Some(config) => config
                .resolve_environment(SubstitutionContext::from_host(&worker.cwd))?
                .into_iter()
                .collect(),
            None => Vec::new(),
        };

        let request = sandboxed::SandboxedLaunch {
            worker,
            prompt: prompt_text,
            profile,
            home_dir,
            scripts_dir,
            workspace_root: self.workspace.root(),
            devcontainer,
            devcontainer_env: &env,
        };
        sandboxed::launch(self.runner, self.config, &request)
            .await
            .map_err(|err| {
                AppError::Runtime(format!("failed to spawn sandboxed worker: {err}. {native_hint}"))
            })?;
        Ok(())
    }

    fn assign_tasks(&self, worker: &Worker, warnings: &mut Warnings) {
        for task in &worker.tasks {
            let slug = slugify_task_path(task);
            let found = match find_task_dir(&worker.yak_path, &slug) {
                Ok(found) => found,
                Err(err) => {
                    warnings.push(
                        WarningStage::TaskAssignment,
                        format!("failed to find task directory for {task}: {err}"),
                    );
                    continue;
                }
            };
            if found.is_ambiguous() {
                warnings.push(
                    WarningStage::AmbiguousTask,
                    format!(
                        "multiple directories match {slug:?}, using first: {}",
                        found.path.display()
                    ),
                );
            }

            if let Err(err) = write_assignment(&found.path, &worker.persona) {
                warnings.push(
                    WarningStage::TaskAssignment,
                    format!("failed to assign task {task}: {err}"),
                );
            }
            if let Some(worktree) = &worker.worktree_path {
                if let Err(err) = write_worktree_marker(&found.path, worktree) {
                    warnings.push(
                        WarningStage::WorktreeMarker,
                        format!("failed to write worktree path for task {task}: {err}"),
                    );
                }
            }
        }
    }
}
