//! Execution backends and the pieces they are built from.
//!
//! Sandboxed workers run `docker run` inside a multiplexer tab; native
//! workers run a tool wrapper script directly in the tab. Both go through
//! [`command::CommandRunner`] for every external program.

pub mod agent;
pub mod command;
pub mod container;
pub mod detect;
pub mod layout;
pub mod multiplexer;
pub mod native;
pub mod profile;
pub mod sandboxed;
pub mod scripts;
pub mod terminator;
