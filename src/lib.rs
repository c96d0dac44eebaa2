#![forbid(unsafe_code)]

//! Launch, track, and tear down AI coding workers, either sandboxed in a
//! container or running natively in a terminal multiplexer tab.

pub mod config;
pub mod devcontainer;
pub mod errors;
pub mod models;
pub mod opencode;
pub mod orchestrator;
pub mod path_safety;
pub mod persona;
pub mod prompt;
pub mod registry;
pub mod runtime;
pub mod workspace;
pub mod worktree;

pub use config::YakBoxConfig;
pub use errors::{AppError, Result};
