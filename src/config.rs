//! Workspace configuration parsing and validation.
//!
//! Configuration lives in `.yak-boxes/config.toml` at the workspace root.
//! The file is optional: every field has a default, so a missing file is
//! equivalent to an empty one.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::path_safety::validate_component;
use crate::{AppError, Result};

/// File name of the configuration file inside the metadata directory.
pub const CONFIG_FILE: &str = "config.toml";

fn default_container_engine() -> String {
    "docker".into()
}

fn default_multiplexer() -> String {
    "zellij".into()
}

fn default_image() -> String {
    "yak-worker:latest".into()
}

fn default_network_name() -> String {
    "yak-shavers".into()
}

fn default_task_dir_name() -> String {
    ".yaks".into()
}

fn default_personas() -> Vec<String> {
    ["Yakriel", "Yakueline", "Yakov", "Yakira"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_wait_retries() -> u32 {
    30
}

fn default_kill_poll_interval_ms() -> u64 {
    100
}

fn default_stop_timeout() -> String {
    "30s".into()
}

/// Configuration parsed from `.yak-boxes/config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct YakBoxConfig {
    /// Container engine binary used for sandboxed workers.
    #[serde(default = "default_container_engine")]
    pub container_engine: String,
    /// Terminal multiplexer binary used to host worker tabs.
    #[serde(default = "default_multiplexer")]
    pub multiplexer: String,
    /// Image used when the devcontainer config does not name one.
    #[serde(default = "default_image")]
    pub default_image: String,
    /// Preferred container network; falls back to `bridge` when absent.
    #[serde(default = "default_network_name")]
    pub network_name: String,
    /// Directory name searched for when discovering the task tracker.
    #[serde(default = "default_task_dir_name")]
    pub task_dir_name: String,
    /// Ordered persona pool used by the round-robin allocator.
    #[serde(default = "default_personas")]
    pub personas: Vec<String>,
    /// Seconds the container shell pane waits for the container to start.
    #[serde(default = "default_wait_retries")]
    pub wait_retries: u32,
    /// Liveness poll interval used while terminating native workers.
    #[serde(default = "default_kill_poll_interval_ms")]
    pub kill_poll_interval_ms: u64,
    /// Default stop timeout in `humantime` syntax (e.g. `30s`, `1m`).
    #[serde(default = "default_stop_timeout")]
    pub default_stop_timeout: String,
}

impl Default for YakBoxConfig {
    fn default() -> Self {
        Self {
            container_engine: default_container_engine(),
            multiplexer: default_multiplexer(),
            default_image: default_image(),
            network_name: default_network_name(),
            task_dir_name: default_task_dir_name(),
            personas: default_personas(),
            wait_retries: default_wait_retries(),
            kill_poll_interval_ms: default_kill_poll_interval_ms(),
            default_stop_timeout: default_stop_timeout(),
        }
    }
}

impl YakBoxConfig {
    /// Load configuration from `<metadata_dir>/config.toml`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file exists but cannot be read,
    /// contains invalid TOML, or fails validation.
    pub fn load_from_dir(metadata_dir: &Path) -> Result<Self> {
        let path = metadata_dir.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed default stop timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the stored value is not a valid duration.
    pub fn stop_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.default_stop_timeout).map_err(|err| {
            AppError::Config(format!(
                "default_stop_timeout '{}' is invalid: {err}",
                self.default_stop_timeout
            ))
        })
    }

    /// Liveness poll interval for the process-tree terminator.
    #[must_use]
    pub fn kill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.kill_poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.personas.is_empty() {
            return Err(AppError::Config("personas must not be empty".into()));
        }

        if self.personas.iter().any(|p| p.trim().is_empty()) {
            return Err(AppError::Config(
                "personas must not contain blank names".into(),
            ));
        }

        for persona in &self.personas {
            validate_component(persona).map_err(|err| {
                AppError::Config(format!("persona {persona:?} cannot name a home directory: {err}"))
            })?;
        }

        if self.kill_poll_interval_ms == 0 {
            return Err(AppError::Config(
                "kill_poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.task_dir_name.trim().is_empty() {
            return Err(AppError::Config("task_dir_name must not be empty".into()));
        }

        self.stop_timeout()?;
        Ok(())
    }
}
