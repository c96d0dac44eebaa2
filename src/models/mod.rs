//! Domain model module declarations.

pub mod report;
pub mod session;
pub mod worker;
