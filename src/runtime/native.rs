//! Native launch: a tool wrapper script in a multiplexer tab.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, info_span, Instrument};

use crate::config::YakBoxConfig;
use crate::models::worker::Worker;
use crate::runtime::agent::{launcher, WrapperContext};
use crate::runtime::command::CommandRunner;
use crate::runtime::layout::{ShellPane, TabLayout};
use crate::runtime::multiplexer::Multiplexer;
use crate::runtime::scripts::write_artifact;
use crate::{AppError, Result};

/// PID file name inside the scripts directory.
pub const PID_FILE: &str = "worker.pid";

/// Files written by a native launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeArtifacts {
    /// Prompt file.
    pub prompt: PathBuf,
    /// Tool wrapper script.
    pub wrapper: PathBuf,
    /// Tab layout.
    pub layout: PathBuf,
    /// PID file the wrapper writes before `exec`.
    pub pid_file: PathBuf,
}

impl NativeArtifacts {
    fn in_dir(dir: &Path) -> Self {
        Self {
            prompt: dir.join("prompt.txt"),
            wrapper: dir.join("run.sh"),
            layout: dir.join("layout.kdl"),
            pid_file: dir.join(PID_FILE),
        }
    }
}

/// Write the wrapper for the worker's tool and open its tab.
///
/// Returns the artifacts; the caller persists `pid_file` in the session.
///
/// # Errors
///
/// Returns `AppError::Io` if an artifact cannot be written and
/// `AppError::Runtime` if the tab cannot be created.
pub async fn launch(
    runner: &dyn CommandRunner,
    config: &YakBoxConfig,
    worker: &Worker,
    prompt: &str,
    scripts_dir: &Path,
) -> Result<NativeArtifacts> {
    let span = info_span!("launch_native", persona = %worker.persona, tool = %worker.tool);

    async {
        fs::create_dir_all(scripts_dir).map_err(|err| {
            AppError::Io(format!(
                "failed to create {}: {err}. Suggestion: check that the .yak-boxes directory \
                 is writable",
                scripts_dir.display()
            ))
        })?;

        let artifacts = NativeArtifacts::in_dir(scripts_dir);
        let strategy = launcher(worker.tool);

        write_artifact(&artifacts.prompt, prompt, false)?;
        let wrapper = strategy.wrapper_script(&WrapperContext {
            yak_path: &worker.yak_path,
            prompt_file: &artifacts.prompt,
            pid_file: &artifacts.pid_file,
            cwd: &worker.cwd,
            model: worker.model.as_deref(),
            agent_name: worker.agent_name.as_deref(),
        });
        write_artifact(&artifacts.wrapper, &wrapper, true)?;

        let pane = strategy.pane_label();
        let layout = TabLayout {
            tab_name: &worker.display_name,
            cwd: Some(&worker.cwd),
            agent_pane: &pane,
            agent_script: &artifacts.wrapper,
            shell: ShellPane::Host { cwd: &worker.cwd },
        };
        write_artifact(&artifacts.layout, &layout.render(), false)?;

        Multiplexer::new(runner, &config.multiplexer)
            .new_tab(
                worker.multiplexer_session.as_deref(),
                &artifacts.layout,
                &worker.display_name,
                Some(&worker.cwd),
            )
            .await?;

        info!(binary = strategy.binary(), "native worker launched");
        Ok(artifacts)
    }
    .instrument(span)
    .await
}
