//! aqua CLI - declarative version manager for developer tools
//!
//! This is the entry point of the `aqua` binary. The proxy shim invokes
//! `aqua exec` internally; users mostly run `aqua install` and let the
//! shims lazy-install everything else.

mod cli;
mod commands;
mod controller;
mod version;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Version(args) => commands::version::run(args),
        Commands::Which(args) => commands::which::run(args, cli.config.as_deref()).await,
        Commands::Install(args) => commands::install::run(args, cli.config.as_deref()).await,
        Commands::Exec(args) => commands::exec::run(args, cli.config.as_deref()).await,
    }
}

/// Initialize tracing from `AQUA_LOG_LEVEL` / `AQUA_LOG_COLOR`, with
/// -v/-q taking precedence over the environment
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose > 0 {
        match verbose {
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    } else {
        match std::env::var("AQUA_LOG_LEVEL") {
            Ok(level) if !level.is_empty() => EnvFilter::new(level),
            _ => EnvFilter::new("info"),
        }
    };

    let ansi = std::env::var("AQUA_LOG_COLOR").as_deref() != Ok("false");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(ansi),
        )
        .with(filter)
        .init();
}
