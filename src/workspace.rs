//! Workspace root discovery and the `.yak-boxes/` metadata layout.
//!
//! ```text
//! <root>/.yak-boxes/
//!     config.toml        optional configuration
//!     sessions.json      session registry
//!     .last-persona      persona cursor
//!     @home/<persona>/   persistent worker homes (scripts/ inside)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::YakBoxConfig;
use crate::runtime::command::{run_checked, CommandRunner, CommandSpec};
use crate::{AppError, Result};

/// Metadata directory name at the workspace root.
pub const METADATA_DIR: &str = ".yak-boxes";
/// Session registry file name.
pub const SESSIONS_FILE: &str = "sessions.json";
/// Persona cursor file name.
pub const PERSONA_CURSOR_FILE: &str = ".last-persona";
/// Directory holding persona homes.
pub const HOMES_DIR: &str = "@home";
/// Launch artifacts directory inside a persona home.
pub const SCRIPTS_DIR: &str = "scripts";
/// Optional helper script used to close multiplexer tabs.
pub const CLOSE_TAB_SCRIPT: &str = "close-zellij-tab.sh";

/// Directories pre-created in every persona home so a container running
/// under a non-root UID does not create them as root.
pub const HOME_SUBDIRS: [&str; 6] = [
    ".local",
    ".local/share",
    ".local/share/opencode",
    ".local/state",
    ".config",
    ".cache",
];

/// A managed workspace rooted at a version-control top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Workspace rooted at an explicit directory.
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Discover the workspace root from the current directory via
    /// `git rev-parse --show-toplevel`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when not inside a git repository.
    pub async fn discover(runner: &dyn CommandRunner) -> Result<Self> {
        let spec = CommandSpec::new("git").args(["rev-parse", "--show-toplevel"]);
        let output = run_checked(runner, &spec).await.map_err(|err| {
            AppError::NotFound(format!(
                "workspace root not found ({err}). Suggestion: run yak-box inside a git repository"
            ))
        })?;

        let root = output.stdout.trim();
        if root.is_empty() {
            return Err(AppError::NotFound(
                "workspace root not found. Suggestion: run yak-box inside a git repository".into(),
            ));
        }
        debug!(root, "workspace root discovered");
        Ok(Self::at(root))
    }

    /// Workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/.yak-boxes`.
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Path of the session registry file.
    #[must_use]
    pub fn sessions_path(&self) -> PathBuf {
        self.metadata_dir().join(SESSIONS_FILE)
    }

    /// Path of the persona cursor file.
    #[must_use]
    pub fn persona_cursor_path(&self) -> PathBuf {
        self.metadata_dir().join(PERSONA_CURSOR_FILE)
    }

    /// Path of the optional tab-closing helper script.
    #[must_use]
    pub fn close_tab_script(&self) -> PathBuf {
        self.root.join(CLOSE_TAB_SCRIPT)
    }

    /// Load `.yak-boxes/config.toml`, or defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file exists but is invalid.
    pub fn load_config(&self) -> Result<YakBoxConfig> {
        YakBoxConfig::load_from_dir(&self.metadata_dir())
    }

    /// Create the metadata directory if needed and return it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created.
    pub fn ensure_metadata_dir(&self) -> Result<PathBuf> {
        let dir = self.metadata_dir();
        fs::create_dir_all(&dir).map_err(|err| {
            AppError::Io(format!("failed to create {}: {err}", dir.display()))
        })?;
        Ok(dir)
    }

    /// Persistent home directory of `persona` (not created).
    #[must_use]
    pub fn home_dir(&self, persona: &str) -> PathBuf {
        self.metadata_dir().join(HOMES_DIR).join(persona)
    }

    /// Launch artifacts directory of `persona` (not created).
    #[must_use]
    pub fn scripts_dir(&self, persona: &str) -> PathBuf {
        self.home_dir(persona).join(SCRIPTS_DIR)
    }

    /// Create the persona home and its standard subdirectories.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` with a remediation hint if any directory
    /// cannot be created.
    pub fn ensure_home_dir(&self, persona: &str) -> Result<PathBuf> {
        let home = self.home_dir(persona);
        for dir in std::iter::once(home.clone()).chain(HOME_SUBDIRS.iter().map(|d| home.join(d))) {
            fs::create_dir_all(&dir).map_err(|err| {
                AppError::Io(format!(
                    "failed to create {}: {err}. Suggestion: check that {METADATA_DIR} is writable",
                    dir.display()
                ))
            })?;
        }
        Ok(home)
    }

    /// Remove the persona home and everything in it.
    ///
    /// A home that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if removal fails.
    pub fn clean_home(&self, persona: &str) -> Result<()> {
        let home = self.home_dir(persona);
        match fs::remove_dir_all(&home) {
            Ok(()) => {
                info!(persona, home = %home.display(), "persona home removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Io(format!(
                "failed to clean {}: {err}",
                home.display()
            ))),
        }
    }

    /// Names of all existing persona homes, sorted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the homes directory cannot be read.
    pub fn list_homes(&self) -> Result<Vec<String>> {
        let dir = self.metadata_dir().join(HOMES_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read {}: {err}",
                    dir.display()
                )))
            }
        };

        let mut homes: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        homes.sort();
        Ok(homes)
    }
}
