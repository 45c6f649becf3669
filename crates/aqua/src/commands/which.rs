//! `aqua which <command>`

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::WhichArgs;
use crate::controller::Container;

pub async fn run(args: WhichArgs, config: Option<&Path>) -> Result<()> {
    let container = Container::new(config.map(Path::to_path_buf))?;
    let which = container.which_controller();
    let wd = std::env::current_dir().context("get the working directory")?;

    let result = which
        .which(&wd, &args.command)
        .await
        .with_context(|| format!("resolve the command: {}", args.command))?;
    println!("{}", result.exe_path.display());
    Ok(())
}
