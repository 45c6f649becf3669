//! Subcommand implementations

pub mod exec;
pub mod install;
pub mod version;
pub mod which;
