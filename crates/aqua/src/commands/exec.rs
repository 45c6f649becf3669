//! `aqua exec -- <command> [args...]`
//!
//! The shim entrypoint. aqua-proxy invokes this internally; the exit code
//! of the child process becomes our own.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::ExecArgs;
use crate::controller::Container;

pub async fn run(args: ExecArgs, config: Option<&Path>) -> Result<()> {
    let (exe_name, exe_args) = parse_exec_args(&args.args)?;

    let container = Container::new(config.map(Path::to_path_buf))?;
    let controller = container.exec_controller();
    let wd = std::env::current_dir().context("get the working directory")?;

    let code = controller
        .exec(&wd, &exe_name, exe_args)
        .await
        .with_context(|| format!("execute the command: {exe_name}"))?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn parse_exec_args(args: &[String]) -> Result<(String, &[String])> {
    let (first, rest) = args.split_first().context("command is required")?;
    let exe_name = Path::new(first)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| first.clone());
    Ok((exe_name, rest))
}
