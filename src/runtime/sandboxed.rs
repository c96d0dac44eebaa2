//! Sandboxed launch: artifacts plus a multiplexer tab running `docker run`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, info_span, Instrument};

use crate::config::YakBoxConfig;
use crate::devcontainer::DevcontainerConfig;
use crate::models::worker::Worker;
use crate::runtime::command::CommandRunner;
use crate::runtime::container::{ContainerEngine, ContainerRun};
use crate::runtime::layout::{ShellPane, TabLayout, SANDBOXED_AGENT_PANE};
use crate::runtime::multiplexer::Multiplexer;
use crate::runtime::profile::ResourceProfile;
use crate::runtime::scripts::{
    exec_script, group_entries, init_script, passwd_entries, wait_script, write_artifact,
    CONTAINER_HOME, CONTAINER_INIT_PATH, CONTAINER_PROMPT_PATH,
};
use crate::{AppError, Result};

/// Host file holding the agent's credentials, relative to the user home.
const AUTH_FILE: &str = ".local/share/opencode/auth.json";

/// Agent mode passed to the init script.
const CONTAINER_AGENT_MODE: &str = "build";

/// Inputs to a sandboxed launch.
#[derive(Debug, Clone, Copy)]
pub struct SandboxedLaunch<'a> {
    /// Worker being launched.
    pub worker: &'a Worker,
    /// Prompt text.
    pub prompt: &'a str,
    /// Resource limits.
    pub profile: &'a ResourceProfile,
    /// Persona home, mounted as the container home.
    pub home_dir: &'a Path,
    /// Directory the artifacts are written to.
    pub scripts_dir: &'a Path,
    /// Workspace root, mounted read-write at the same path.
    pub workspace_root: &'a Path,
    /// Devcontainer configuration of the working directory.
    pub devcontainer: Option<&'a DevcontainerConfig>,
    /// Environment resolved from the devcontainer configuration.
    pub devcontainer_env: &'a [(String, String)],
}

/// Files written by a sandboxed launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxedArtifacts {
    /// Prompt file.
    pub prompt: PathBuf,
    /// In-container init script.
    pub init: PathBuf,
    /// Shell-pane wait script.
    pub wait: PathBuf,
    /// Synthetic `/etc/passwd`.
    pub passwd: PathBuf,
    /// Synthetic `/etc/group`.
    pub group: PathBuf,
    /// `docker run` wrapper.
    pub run: PathBuf,
    /// Tab layout.
    pub layout: PathBuf,
}

impl SandboxedArtifacts {
    fn in_dir(dir: &Path) -> Self {
        Self {
            prompt: dir.join("prompt.txt"),
            init: dir.join("inner.sh"),
            wait: dir.join("shell-exec.sh"),
            passwd: dir.join("passwd"),
            group: dir.join("group"),
            run: dir.join("run.sh"),
            layout: dir.join("layout.kdl"),
        }
    }
}

/// UID and GID of the invoking user.
#[cfg(unix)]
#[must_use]
pub fn host_ids() -> (u32, u32) {
    (
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
    )
}

/// UID and GID of the invoking user.
#[cfg(not(unix))]
#[must_use]
pub fn host_ids() -> (u32, u32) {
    (1000, 1000)
}

fn mount(source: &Path, target: impl AsRef<Path>, mode: &str) -> String {
    format!(
        "{}:{}:{mode}",
        source.display(),
        target.as_ref().display()
    )
}

/// Build the `docker run` invocation for a launch.
#[must_use]
pub fn container_run(
    config: &YakBoxConfig,
    req: &SandboxedLaunch<'_>,
    artifacts: &SandboxedArtifacts,
    network: String,
    user: (u32, u32),
) -> ContainerRun {
    let worker = req.worker;
    let root = req.workspace_root;

    let mut volumes = vec![
        mount(root, root, "rw"),
        mount(&artifacts.prompt, CONTAINER_PROMPT_PATH, "ro"),
        mount(&artifacts.init, CONTAINER_INIT_PATH, "ro"),
        mount(req.home_dir, CONTAINER_HOME, "rw"),
    ];
    if let Some(worktree) = &worker.worktree_path {
        volumes.push(mount(worktree, worktree, "rw"));
    }
    if let Some(auth) = dirs::home_dir().map(|home| home.join(AUTH_FILE)) {
        if auth.is_file() {
            volumes.push(mount(&auth, Path::new(CONTAINER_HOME).join(AUTH_FILE), "ro"));
        }
    }
    volumes.push(mount(&artifacts.passwd, "/etc/passwd", "ro"));
    volumes.push(mount(&artifacts.group, "/etc/group", "ro"));

    let mut mounts = Vec::new();
    if let Some(devcontainer) = req.devcontainer {
        for extra in &devcontainer.mounts {
            if extra.contains('=') {
                mounts.push(extra.clone());
            } else {
                volumes.push(extra.clone());
            }
        }
    }

    let mut env = vec![
        ("HOME".to_owned(), CONTAINER_HOME.to_owned()),
        ("GOPATH".to_owned(), format!("{CONTAINER_HOME}/.go")),
        ("CARGO_HOME".to_owned(), format!("{CONTAINER_HOME}/.cargo")),
        ("RUSTUP_HOME".to_owned(), format!("{CONTAINER_HOME}/.rustup")),
    ];
    if req.profile.name == "ram" {
        env.push(("CARGO_BUILD_JOBS".to_owned(), "4".to_owned()));
    }
    env.extend([
        ("WORKER_NAME".to_owned(), worker.persona.clone()),
        (
            "YAK_PATH".to_owned(),
            worker.yak_path.to_string_lossy().into_owned(),
        ),
        (
            "WORKSPACE_ROOT".to_owned(),
            root.to_string_lossy().into_owned(),
        ),
    ]);
    env.extend(req.devcontainer_env.iter().cloned());

    let image = req
        .devcontainer
        .and_then(DevcontainerConfig::image)
        .map_or_else(|| config.default_image.clone(), str::to_owned);

    ContainerRun {
        engine: config.container_engine.clone(),
        name: worker.container_name.clone(),
        user,
        network,
        profile: req.profile.clone(),
        volumes,
        mounts,
        workdir: worker.cwd.clone(),
        env,
        passthrough_env: vec!["TERM".to_owned()],
        image,
        command: vec![
            "bash".to_owned(),
            CONTAINER_INIT_PATH.to_owned(),
            CONTAINER_AGENT_MODE.to_owned(),
        ],
    }
}

/// Write the sandboxed artifacts and open the worker's tab.
///
/// # Errors
///
/// Returns `AppError::Io` if an artifact cannot be written and
/// `AppError::Runtime` if the tab cannot be created.
pub async fn launch(
    runner: &dyn CommandRunner,
    config: &YakBoxConfig,
    req: &SandboxedLaunch<'_>,
) -> Result<SandboxedArtifacts> {
    let worker = req.worker;
    let span = info_span!(
        "launch_sandboxed",
        persona = %worker.persona,
        container = %worker.container_name
    );

    async {
        fs::create_dir_all(req.scripts_dir).map_err(|err| {
            AppError::Io(format!(
                "failed to create {}: {err}. Suggestion: check that the .yak-boxes directory \
                 is writable",
                req.scripts_dir.display()
            ))
        })?;

        let artifacts = SandboxedArtifacts::in_dir(req.scripts_dir);
        let (uid, gid) = host_ids();

        write_artifact(&artifacts.prompt, req.prompt, false)?;
        write_artifact(&artifacts.init, &init_script(), true)?;
        write_artifact(
            &artifacts.wait,
            &wait_script(&config.container_engine, config.wait_retries),
            true,
        )?;
        write_artifact(&artifacts.passwd, &passwd_entries(uid, gid), false)?;
        write_artifact(&artifacts.group, &group_entries(gid), false)?;

        let network = ContainerEngine::new(runner, &config.container_engine)
            .network_mode(&config.network_name)
            .await;
        let run = container_run(config, req, &artifacts, network, (uid, gid));
        let preamble = [
            ": \"${TERM:=xterm-256color}\"".to_owned(),
            "export TERM".to_owned(),
        ];
        write_artifact(
            &artifacts.run,
            &exec_script(&preamble, &run.to_command().argv()),
            true,
        )?;

        let layout = TabLayout {
            tab_name: &worker.display_name,
            cwd: None,
            agent_pane: SANDBOXED_AGENT_PANE,
            agent_script: &artifacts.run,
            shell: ShellPane::Container {
                wait_script: &artifacts.wait,
                container: &worker.container_name,
            },
        };
        write_artifact(&artifacts.layout, &layout.render(), false)?;

        Multiplexer::new(runner, &config.multiplexer)
            .new_tab(
                worker.multiplexer_session.as_deref(),
                &artifacts.layout,
                &worker.display_name,
                None,
            )
            .await?;

        info!(image = %run.image, network = %run.network, "sandboxed worker launched");
        Ok(artifacts)
    }
    .instrument(span)
    .await
}
