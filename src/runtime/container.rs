//! Container engine operations and `docker run` argument construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, info_span, Instrument};

use crate::devcontainer::DEVCONTAINER_DIR;
use crate::models::worker::CONTAINER_NAME_PREFIX;
use crate::runtime::command::{
    non_empty_lines, run_checked, run_succeeds, CommandRunner, CommandSpec,
};
use crate::runtime::profile::ResourceProfile;
use crate::{AppError, Result};

/// Image label recording the `.devcontainer` commit an image was built from.
pub const COMMIT_LABEL: &str = "yakthang.devcontainer.commit";

/// Network used when the preferred one does not exist.
pub const FALLBACK_NETWORK: &str = "bridge";

/// Seconds the engine waits for the agent to exit on `docker stop` issued
/// by the engine itself (daemon shutdown).
pub const CONTAINER_STOP_TIMEOUT_SECS: u32 = 7200;

/// What [`ContainerEngine::ensure_image`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// The image existed and was current.
    Present,
    /// The image was missing and has been built.
    Built,
    /// The image was stale and has been rebuilt.
    Rebuilt,
}

/// A worker container as reported by `ps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    /// Container name.
    pub name: String,
    /// Engine status text, e.g. `Up 2 hours` or `Exited (0) 5 minutes ago`.
    pub status: String,
    /// Age text, e.g. `2 hours ago`; empty when not requested.
    pub running_for: String,
}

impl ContainerStatus {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        Some(Self {
            name: fields.next()?.trim().to_owned(),
            status: fields.next()?.trim().to_owned(),
            running_for: fields.next().unwrap_or_default().trim().to_owned(),
        })
    }
}

/// Full description of one `docker run` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRun {
    /// Engine binary.
    pub engine: String,
    /// Container name.
    pub name: String,
    /// Numeric `uid:gid` the container runs as.
    pub user: (u32, u32),
    /// Network to attach to.
    pub network: String,
    /// Resource limits.
    pub profile: ResourceProfile,
    /// Bind mounts in `-v src:dst[:mode]` form.
    pub volumes: Vec<String>,
    /// Mounts in `--mount key=value,...` form.
    pub mounts: Vec<String>,
    /// Working directory inside the container.
    pub workdir: PathBuf,
    /// Environment set explicitly.
    pub env: Vec<(String, String)>,
    /// Environment passed through from the invoking shell.
    pub passthrough_env: Vec<String>,
    /// Image to run.
    pub image: String,
    /// Command run in the container.
    pub command: Vec<String>,
}

impl ContainerRun {
    fn volume_targets(&self) -> Vec<&Path> {
        self.volumes
            .iter()
            .filter_map(|v| v.split(':').nth(1))
            .map(Path::new)
            .collect()
    }

    /// Profile tmpfs mounts not shadowed by a bind mount.
    fn tmpfs_mounts(&self) -> Vec<String> {
        let targets = self.volume_targets();
        self.profile
            .tmpfs
            .iter()
            .filter(|(mount_point, _)| {
                !targets
                    .iter()
                    .any(|target| Path::new(mount_point).starts_with(target))
            })
            .map(|(mount_point, opts)| format!("{mount_point}:rw,{opts}"))
            .collect()
    }

    /// The invocation as an argument vector.
    #[must_use]
    pub fn to_command(&self) -> CommandSpec {
        let (uid, gid) = self.user;
        let mut spec = CommandSpec::new(&self.engine)
            .args(["run", "-it", "--rm", "--name"])
            .arg(&self.name)
            .arg("--user")
            .arg(format!("{uid}:{gid}"))
            .arg("--network")
            .arg(&self.network)
            .args(["--security-opt", "no-new-privileges", "--cap-drop", "ALL"]);

        for tmpfs in self.tmpfs_mounts() {
            spec = spec.arg("--tmpfs").arg(tmpfs);
        }

        if self.profile.cpu_share() > 0.0 {
            spec = spec.arg("--cpus").arg(self.profile.cpus);
        }
        spec = spec.arg("--memory").arg(self.profile.memory);
        if let Some(swap) = self.profile.swap {
            spec = spec.arg("--memory-swap").arg(swap);
        }
        spec = spec
            .arg("--pids-limit")
            .arg(self.profile.pids.to_string())
            .arg("--stop-timeout")
            .arg(CONTAINER_STOP_TIMEOUT_SECS.to_string());

        for volume in &self.volumes {
            spec = spec.arg("-v").arg(volume);
        }
        for mount in &self.mounts {
            spec = spec.arg("--mount").arg(mount);
        }

        spec = spec.arg("-w").path_arg(&self.workdir);
        for (key, value) in &self.env {
            spec = spec.arg("-e").arg(format!("{key}={value}"));
        }
        for key in &self.passthrough_env {
            spec = spec.arg("-e").arg(key);
        }

        spec.arg(&self.image).args(self.command.iter().cloned())
    }
}

/// Operations against the container engine CLI.
pub struct ContainerEngine<'a> {
    runner: &'a dyn CommandRunner,
    binary: &'a str,
}

impl<'a> ContainerEngine<'a> {
    /// Engine driven through `binary`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, binary: &'a str) -> Self {
        Self { runner, binary }
    }

    fn cmd(&self) -> CommandSpec {
        CommandSpec::new(self.binary)
    }

    /// `preferred` when that network exists, else `bridge`.
    pub async fn network_mode(&self, preferred: &str) -> String {
        let probe = self.cmd().args(["network", "inspect", preferred]);
        if run_succeeds(self.runner, &probe).await {
            preferred.to_owned()
        } else {
            debug!(network = preferred, "network missing, using bridge");
            FALLBACK_NETWORK.to_owned()
        }
    }

    /// Whether a container named exactly `name` exists (running or not).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Command` if the engine cannot be queried.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let spec = self
            .cmd()
            .args(["ps", "-a", "--filter"])
            .arg(format!("name=^{name}$"))
            .args(["--format", "{{.Names}}"]);
        let output = run_checked(self.runner, &spec).await?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Stop `name`, waiting up to `timeout`, then remove it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no such container exists, and
    /// `AppError::Command` with a remediation hint if stop or removal fails.
    pub async fn stop_and_remove(&self, name: &str, timeout: Duration) -> Result<()> {
        let span = info_span!("stop_container", container = name);
        async {
            if !self.exists(name).await? {
                return Err(AppError::NotFound(format!(
                    "container {name} not found. Suggestion: use '{} ps -a' to list containers",
                    self.binary
                )));
            }

            let stop = self
                .cmd()
                .args(["stop", "-t"])
                .arg(timeout.as_secs().to_string())
                .arg(name);
            run_checked(self.runner, &stop).await.map_err(|err| {
                AppError::Command(format!(
                    "{err}. Suggestion: try '{} stop {name}' manually",
                    self.binary
                ))
            })?;

            run_checked(self.runner, &self.cmd().args(["rm", name]))
                .await
                .map_err(|err| {
                    AppError::Command(format!(
                        "{err}. Suggestion: try '{} rm -f {name}' manually",
                        self.binary
                    ))
                })?;

            info!("container stopped and removed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Worker containers; stopped ones too when `all`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Command` if the engine cannot be queried.
    pub async fn list_workers(&self, all: bool) -> Result<Vec<String>> {
        let mut spec = self.cmd().arg("ps");
        if all {
            spec = spec.arg("-a");
        }
        let spec = spec
            .arg("--filter")
            .arg(format!("name={CONTAINER_NAME_PREFIX}"))
            .args(["--format", "{{.Names}}"]);
        let output = run_checked(self.runner, &spec).await?;
        Ok(non_empty_lines(&output.stdout))
    }

    /// Status of running worker containers, or of exited ones when
    /// `exited` is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Command` if the engine call fails.
    pub async fn worker_statuses(&self, exited: bool) -> Result<Vec<ContainerStatus>> {
        let mut spec = self.cmd().arg("ps");
        if exited {
            spec = spec.args(["-a", "--filter", "status=exited"]);
        }
        let spec = spec
            .arg("--filter")
            .arg(format!("name={CONTAINER_NAME_PREFIX}"))
            .args(["--format", "{{.Names}}\t{{.Status}}\t{{.RunningFor}}"]);
        let output = run_checked(self.runner, &spec).await?;
        Ok(non_empty_lines(&output.stdout)
            .iter()
            .filter_map(|line| ContainerStatus::parse(line))
            .collect())
    }

    /// Make sure `image` exists and matches the workspace's `.devcontainer`.
    ///
    /// Without a `.devcontainer` directory an existing image is used as-is.
    /// With one, a missing image is built and an image whose commit label
    /// differs from the directory's commit (or whose directory has
    /// uncommitted changes) is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runtime` if the image is missing with nothing to
    /// build it from, or if git or the build fails.
    pub async fn ensure_image(&self, image: &str, workspace_root: &Path) -> Result<ImageStatus> {
        let devcontainer_dir = workspace_root.join(DEVCONTAINER_DIR);
        let buildable = devcontainer_dir.is_dir();
        let exists = run_succeeds(self.runner, &self.cmd().args(["image", "inspect", image])).await;

        match (exists, buildable) {
            (true, false) => Ok(ImageStatus::Present),
            (false, false) => Err(AppError::Runtime(format!(
                "{image} image not found and no {DEVCONTAINER_DIR}/Dockerfile to build from. \
                 Suggestion: build or pull {image}, or use --runtime=native"
            ))),
            (false, true) => {
                self.build_image(image, workspace_root, &devcontainer_dir).await?;
                Ok(ImageStatus::Built)
            }
            (true, true) => {
                if self.image_current(image, &devcontainer_dir).await? {
                    Ok(ImageStatus::Present)
                } else {
                    self.build_image(image, workspace_root, &devcontainer_dir).await?;
                    Ok(ImageStatus::Rebuilt)
                }
            }
        }
    }

    async fn devcontainer_commit(&self, devcontainer_dir: &Path) -> Result<String> {
        let spec = CommandSpec::new("git")
            .arg("-C")
            .path_arg(devcontainer_dir)
            .args(["rev-parse", "HEAD"]);
        let output = run_checked(self.runner, &spec).await.map_err(|err| {
            AppError::Runtime(format!("failed to read {DEVCONTAINER_DIR} commit: {err}"))
        })?;
        Ok(output.stdout.trim().to_owned())
    }

    async fn image_current(&self, image: &str, devcontainer_dir: &Path) -> Result<bool> {
        let current = self.devcontainer_commit(devcontainer_dir).await?;

        let label = self
            .cmd()
            .args(["image", "inspect", image, "--format"])
            .arg(format!("{{{{index .Config.Labels \"{COMMIT_LABEL}\"}}}}"));
        let stored = run_checked(self.runner, &label)
            .await
            .map_err(|err| AppError::Runtime(format!("failed to inspect {image}: {err}")))?;
        if stored.stdout.trim() != current {
            debug!(image, current, stored = stored.stdout.trim(), "image commit differs");
            return Ok(false);
        }

        let status = CommandSpec::new("git")
            .arg("-C")
            .path_arg(devcontainer_dir)
            .args(["status", "--porcelain", "."]);
        let dirty = run_checked(self.runner, &status)
            .await
            .map_err(|err| AppError::Runtime(format!("failed to check git status: {err}")))?;
        Ok(dirty.stdout.trim().is_empty())
    }

    async fn build_image(
        &self,
        image: &str,
        workspace_root: &Path,
        devcontainer_dir: &Path,
    ) -> Result<()> {
        let commit = self.devcontainer_commit(devcontainer_dir).await?;
        info!(image, commit, "building worker image");

        let spec = self
            .cmd()
            .args(["build", "-t", image, "-f"])
            .arg(format!("{DEVCONTAINER_DIR}/Dockerfile"))
            .arg("--label")
            .arg(format!("{COMMIT_LABEL}={commit}"))
            .arg(".")
            .current_dir(workspace_root);
        run_checked(self.runner, &spec)
            .await
            .map_err(|err| AppError::Runtime(format!("failed to build {image}: {err}")))?;
        Ok(())
    }
}
