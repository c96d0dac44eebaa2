//! Stop: tear a worker down and forget it.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};

use super::tasks::clear_assignment;
use super::Orchestrator;
use crate::models::report::{StopReport, WarningStage, Warnings};
use crate::models::session::Session;
use crate::models::worker::{container_name, RuntimeKind};
use crate::registry::SessionStore;
use crate::runtime::container::ContainerEngine;
use crate::runtime::multiplexer::{Multiplexer, TabClose};
use crate::runtime::terminator::Termination;
use crate::{AppError, Result};

/// Inputs to a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRequest {
    /// Session to stop.
    pub session_name: String,
    /// How long the worker gets to exit before it is killed.
    pub timeout: Duration,
    /// Leave task assignments in place.
    pub force: bool,
    /// Only describe what would be done.
    pub dry_run: bool,
}

impl<S: SessionStore> Orchestrator<'_, S> {
    /// Stop the worker registered as `request.session_name`.
    ///
    /// A session missing from the registry is looked up among worker
    /// containers. Teardown failures past the lookup are returned as
    /// warnings; the persona home is kept.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when neither the registry nor the
    /// container engine knows the worker.
    pub async fn stop(&self, request: &StopRequest) -> Result<StopReport> {
        let span = info_span!("stop", session = %request.session_name, dry_run = request.dry_run);
        self.stop_inner(request).instrument(span).await
    }

    async fn stop_inner(&self, request: &StopRequest) -> Result<StopReport> {
        let name = request.session_name.as_str();
        let session = self.find_session(name).await?;

        let mut report = StopReport {
            session_name: name.to_owned(),
            runtime: session.runtime,
            dry_run: request.dry_run,
            actions: Vec::new(),
            warnings: Warnings::default(),
        };

        if !request.force {
            if let Some(task) = &session.task {
                self.clear_task(&session, task, &mut report);
            }
        }

        match session.runtime {
            RuntimeKind::Sandboxed => self.stop_sandboxed(name, &session, request, &mut report).await,
            RuntimeKind::Native => self.stop_native(&session, request, &mut report).await,
        }

        if !request.dry_run {
            if let Err(err) = self.registry.unregister(name) {
                report.warnings.push(
                    WarningStage::Unregister,
                    format!("failed to unregister session: {err}"),
                );
            }
        }

        info!(
            runtime = %report.runtime,
            warnings = report.warnings.as_slice().len(),
            "worker stopped"
        );
        Ok(report)
    }

    async fn find_session(&self, name: &str) -> Result<Session> {
        let err = match self.registry.get(name) {
            Ok(session) => return Ok(session),
            Err(err) => err,
        };
        warn!(%err, "session lookup failed, falling back to container scan");

        let container = container_name(name);
        let engine = ContainerEngine::new(self.runner, &self.config.container_engine);
        let (workers, scan_error) = match engine.list_workers(true).await {
            Ok(workers) => (workers, None),
            Err(err) => {
                warn!(%err, "container scan failed");
                (Vec::new(), Some(err))
            }
        };
        if workers.iter().any(|w| *w == container) {
            info!(container, "found worker container without a session");
            return Ok(Session {
                worker: String::new(),
                task: None,
                container: Some(container),
                spawned_at: Utc::now(),
                runtime: RuntimeKind::Sandboxed,
                cwd: self.workspace.root().to_path_buf(),
                display_name: name.to_owned(),
                zellij_session: None,
                pid_file: None,
                yak_path: None,
            });
        }

        let scan_note = scan_error
            .map(|err| format!(" (container scan failed: {err})"))
            .unwrap_or_default();
        Err(AppError::Validation(format!(
            "worker not found{scan_note}. Use '{} ps' or '{} list-sessions' to find running \
             workers, or check .yak-boxes/sessions.json",
            self.config.container_engine, self.config.multiplexer
        )))
    }

    fn clear_task(&self, session: &Session, task: &str, report: &mut StopReport) {
        let yak_path: PathBuf = session
            .yak_path
            .clone()
            .unwrap_or_else(|| self.workspace.root().join(&self.config.task_dir_name));

        if report.dry_run {
            report.actions.push(format!("clear assignment: {task}"));
            return;
        }
        match clear_assignment(&yak_path, task) {
            Ok(removed) => {
                if removed {
                    report.actions.push(format!("cleared assignment: {task}"));
                }
            }
            Err(err) => report.warnings.push(
                WarningStage::AssignmentCleanup,
                format!("failed to clear assignment for {task}: {err}"),
            ),
        }
    }

    async fn close_tab(&self, session: &Session, report: &mut StopReport) {
        let helper = self.workspace.close_tab_script();
        let helper = helper.is_file().then_some(helper.as_path());

        match Multiplexer::new(self.runner, &self.config.multiplexer)
            .close_tab(session.zellij_session.as_deref(), &session.display_name, helper)
            .await
        {
            Ok(TabClose::Closed) => report
                .actions
                .push(format!("closed tab: {}", session.display_name)),
            Ok(TabClose::NotFound) => {}
            Err(err) => report
                .warnings
                .push(WarningStage::TabClose, format!("failed to close tab: {err}")),
        }
    }

    async fn stop_sandboxed(
        &self,
        name: &str,
        session: &Session,
        request: &StopRequest,
        report: &mut StopReport,
    ) {
        let container = session
            .container
            .clone()
            .unwrap_or_else(|| container_name(name));

        if request.dry_run {
            report
                .actions
                .push(format!("close tab: {}", session.display_name));
            report.actions.push(format!("stop container: {container}"));
            return;
        }

        self.close_tab(session, report).await;

        match ContainerEngine::new(self.runner, &self.config.container_engine)
            .stop_and_remove(&container, request.timeout)
            .await
        {
            Ok(()) => report.actions.push(format!("stopped container: {container}")),
            Err(err) => report
                .warnings
                .push(WarningStage::ContainerStop, err.to_string()),
        }
    }

    async fn stop_native(&self, session: &Session, request: &StopRequest, report: &mut StopReport) {
        if request.dry_run {
            if let Some(pid_file) = &session.pid_file {
                report.actions.push(format!(
                    "kill process tree via PID file: {}",
                    pid_file.display()
                ));
            }
            report
                .actions
                .push(format!("close tab: {}", session.display_name));
            return;
        }

        if let Some(pid_file) = &session.pid_file {
            match self.terminator.kill(pid_file, request.timeout).await {
                Ok(Termination::AlreadyExited) => {
                    report.actions.push("process tree already exited".to_owned());
                }
                Ok(Termination::Terminated | Termination::Killed) => {
                    report.actions.push("terminated process tree".to_owned());
                }
                Err(err) => report.warnings.push(
                    WarningStage::ProcessKill,
                    format!("failed to kill process tree: {err}"),
                ),
            }
        }

        self.close_tab(session, report).await;
    }
}
