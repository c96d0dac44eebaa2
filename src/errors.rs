//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Exit code for usage and validation failures.
pub const EXIT_VALIDATION: i32 = 2;

/// Exit code for every other failure.
pub const EXIT_RUNTIME: i32 = 1;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Malformed input or mutually exclusive flags.
    Validation(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Session registry read, write, or lock failure.
    Registry(String),
    /// External subprocess could not be started or exited unsuccessfully.
    Command(String),
    /// No usable execution backend, or a launch step failed.
    Runtime(String),
    /// File system path failed validation against its boundary directory.
    PathViolation(String),
    /// Git worktree creation or lookup failure.
    Worktree(String),
    /// Devcontainer configuration could not be read or parsed.
    Devcontainer(String),
    /// Process-tree termination failure.
    Process(String),
}

impl AppError {
    /// Process exit code for this error.
    ///
    /// Validation errors map to `2`; everything else maps to `1`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => EXIT_VALIDATION,
            _ => EXIT_RUNTIME,
        }
    }

    /// Whether this error represents a missing entity.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::Command(msg) => write!(f, "command: {msg}"),
            Self::Runtime(msg) => write!(f, "runtime: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::Worktree(msg) => write!(f, "worktree: {msg}"),
            Self::Devcontainer(msg) => write!(f, "devcontainer: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Registry(format!("invalid json: {err}"))
    }
}
