//! Execution backend detection.

use tracing::debug;

use crate::config::YakBoxConfig;
use crate::models::worker::RuntimeKind;
use crate::runtime::command::{run_succeeds, CommandRunner, CommandSpec};

/// Outcome of probing the host for a usable backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detected {
    /// A backend was found.
    Available(RuntimeKind),
    /// Neither the container engine nor the multiplexer is usable.
    Unknown,
}

impl Detected {
    /// Label used in logs and messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available(kind) => kind.as_str(),
            Self::Unknown => "unknown",
        }
    }
}

/// Whether `binary` resolves on the search path.
#[must_use]
pub fn on_search_path(binary: &str) -> bool {
    which::which(binary).is_ok()
}

/// Probe for an execution backend using the real search path.
pub async fn detect(runner: &dyn CommandRunner, config: &YakBoxConfig) -> Detected {
    detect_with(runner, config, on_search_path).await
}

/// Probe for an execution backend.
///
/// Sandboxed when the container engine is on the path and `<engine> ps`
/// succeeds; otherwise native when the multiplexer is on the path.
pub async fn detect_with(
    runner: &dyn CommandRunner,
    config: &YakBoxConfig,
    on_path: impl Fn(&str) -> bool,
) -> Detected {
    if on_path(&config.container_engine) {
        let probe = CommandSpec::new(&config.container_engine).arg("ps");
        if run_succeeds(runner, &probe).await {
            return Detected::Available(RuntimeKind::Sandboxed);
        }
        debug!(engine = %config.container_engine, "container engine present but not responding");
    }

    if on_path(&config.multiplexer) {
        return Detected::Available(RuntimeKind::Native);
    }

    Detected::Unknown
}
