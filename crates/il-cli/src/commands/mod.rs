//! CLI subcommand implementations.

pub mod check;
pub mod format;
pub mod replay;
pub mod run;
