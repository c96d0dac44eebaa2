//! Terminal multiplexer tab management.

use std::path::Path;

use tracing::{debug, info};

use crate::runtime::command::{run_checked, CommandRunner, CommandSpec};
use crate::{AppError, Result};

/// Outcome of a tab close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabClose {
    /// The tab was closed.
    Closed,
    /// No tab with that name exists.
    NotFound,
}

/// Drives the multiplexer CLI (`zellij action ...`).
pub struct Multiplexer<'a> {
    runner: &'a dyn CommandRunner,
    binary: &'a str,
}

impl<'a> Multiplexer<'a> {
    /// Multiplexer driven through `binary`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, binary: &'a str) -> Self {
        Self { runner, binary }
    }

    fn action(&self, session: Option<&str>) -> CommandSpec {
        let mut spec = CommandSpec::new(self.binary);
        if let Some(session) = session {
            spec = spec.args(["--session", session]);
        }
        spec.arg("action")
    }

    /// Open a new tab from `layout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` with a remediation hint if the tab
    /// cannot be created.
    pub async fn new_tab(
        &self,
        session: Option<&str>,
        layout: &Path,
        name: &str,
        cwd: Option<&Path>,
    ) -> Result<()> {
        let mut spec = self
            .action(session)
            .arg("new-tab")
            .arg("--layout")
            .path_arg(layout)
            .args(["--name", name]);
        if let Some(cwd) = cwd {
            spec = spec.arg("--cwd").path_arg(cwd);
        }

        run_checked(self.runner, &spec).await.map_err(|err| {
            AppError::Runtime(format!(
                "failed to create {} tab: {err}. Suggestion: ensure {} is installed and \
                 running, or pass --session to target an existing session",
                self.binary, self.binary
            ))
        })?;
        info!(tab = name, "tab created");
        Ok(())
    }

    /// 1-based index of the tab titled `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Command` if tab names cannot be queried.
    pub async fn tab_index(&self, session: Option<&str>, name: &str) -> Result<Option<usize>> {
        let spec = self.action(session).arg("query-tab-names");
        let output = run_checked(self.runner, &spec).await?;
        Ok(output
            .stdout
            .trim()
            .lines()
            .position(|tab| tab == name)
            .map(|idx| idx + 1))
    }

    /// Close the tab titled `name`.
    ///
    /// Uses `helper` when given (a user script taking `[--session S] NAME`);
    /// otherwise navigates to the tab by index and closes it, so a missing
    /// tab never closes whichever tab happens to be focused.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Command` if any multiplexer call fails.
    pub async fn close_tab(
        &self,
        session: Option<&str>,
        name: &str,
        helper: Option<&Path>,
    ) -> Result<TabClose> {
        if let Some(helper) = helper {
            let mut spec = CommandSpec::new(helper.to_string_lossy());
            if let Some(session) = session {
                spec = spec.args(["--session", session]);
            }
            run_checked(self.runner, &spec.arg(name)).await?;
            return Ok(TabClose::Closed);
        }

        let Some(index) = self.tab_index(session, name).await? else {
            debug!(tab = name, "tab not found, nothing to close");
            return Ok(TabClose::NotFound);
        };

        let go_to = self.action(session).arg("go-to-tab").arg(index.to_string());
        run_checked(self.runner, &go_to).await?;
        run_checked(self.runner, &self.action(session).arg("close-tab")).await?;
        info!(tab = name, index, "tab closed");
        Ok(TabClose::Closed)
    }
}
