//! Devcontainer configuration consumed by sandboxed workers.
//!
//! Only the parts that shape `docker run` are read: image, environment,
//! mounts, and the security-relevant settings.

pub mod security;
pub mod variables;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

pub use security::{audit, SecurityFinding, Severity};
pub use variables::{SubstitutionContext, Substituter};

/// Directory holding the configuration, relative to the project.
pub const DEVCONTAINER_DIR: &str = ".devcontainer";
/// Configuration file name.
pub const DEVCONTAINER_FILE: &str = "devcontainer.json";

fn default_remote_user() -> String {
    "root".into()
}

/// Parsed `.devcontainer/devcontainer.json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DevcontainerConfig {
    /// Image to run.
    #[serde(default)]
    pub image: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// User for `exec` operations.
    #[serde(default = "default_remote_user")]
    pub remote_user: String,
    /// Environment set on the container.
    #[serde(default)]
    pub container_env: BTreeMap<String, String>,
    /// Environment for tool processes; an empty or null value removes
    /// the variable.
    #[serde(default)]
    pub remote_env: BTreeMap<String, Option<String>>,
    /// Extra mounts in docker `--mount`/`-v` syntax.
    #[serde(default)]
    pub mounts: Vec<String>,
    /// Extra `docker run` arguments (not applied; audited only).
    #[serde(default)]
    pub run_args: Vec<String>,
    /// Privileged mode.
    #[serde(default)]
    pub privileged: Option<bool>,
    /// Added capabilities.
    #[serde(default)]
    pub cap_add: Vec<String>,
    /// Security options.
    #[serde(default)]
    pub security_opt: Vec<String>,
}

impl DevcontainerConfig {
    /// Path of the configuration file for `project`.
    #[must_use]
    pub fn path_for(project: &Path) -> PathBuf {
        project.join(DEVCONTAINER_DIR).join(DEVCONTAINER_FILE)
    }

    /// Load the configuration for `project`; `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Devcontainer` if the file exists but cannot be
    /// read or is not valid JSON.
    pub fn load(project: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(project);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(project = %project.display(), "no devcontainer config");
                return Ok(None);
            }
            Err(err) => {
                return Err(AppError::Devcontainer(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };

        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            AppError::Devcontainer(format!(
                "invalid {}: {err}. Suggestion: ensure devcontainer.json is valid JSON",
                path.display()
            ))
        })?;
        Ok(Some(config))
    }

    /// Image named by the configuration, if non-blank.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|i| !i.trim().is_empty())
    }

    /// Resolve the worker environment.
    ///
    /// `containerEnv` is substituted first and fed back into the context so
    /// `remoteEnv` can reference it with `${containerEnv:NAME}`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Devcontainer` if the substitution engine cannot
    /// be built.
    pub fn resolve_environment(
        &self,
        context: SubstitutionContext,
    ) -> Result<BTreeMap<String, String>> {
        let mut engine = Substituter::new(context)?;
        let mut resolved = BTreeMap::new();

        for (key, value) in &self.container_env {
            let value = engine.substitute(value);
            engine.context.container_env.insert(key.clone(), value.clone());
            resolved.insert(key.clone(), value);
        }

        for (key, value) in &self.remote_env {
            match value.as_deref() {
                None | Some("") => {
                    resolved.remove(key);
                }
                Some(value) => {
                    resolved.insert(key.clone(), engine.substitute(value));
                }
            }
        }

        Ok(resolved)
    }
}
