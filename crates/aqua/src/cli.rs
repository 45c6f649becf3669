//! CLI argument parsing with clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// aqua - declarative CLI version manager
#[derive(Parser, Debug)]
#[command(name = "aqua")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the workspace configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version(VersionArgs),

    /// Print the path a command resolves to
    Which(WhichArgs),

    /// Install all packages declared by the workspace configuration
    Install(InstallArgs),

    /// Execute a tool (used internally by aqua-proxy)
    Exec(ExecArgs),
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WhichArgs {
    /// The command name to resolve
    pub command: String,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Only recreate the proxy links, skip downloads
    #[arg(short, long)]
    pub link_only: bool,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// The executed command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
