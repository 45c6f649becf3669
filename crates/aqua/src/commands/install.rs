//! `aqua install`
//!
//! Installs every package declared by the workspace configuration: plant
//! the proxy and its links, then download/verify/extract all missing
//! packages concurrently. Individual failures don't stop the batch; the
//! command exits non-zero if any install failed.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::info;

use aqua_core::checksum::Checksums;
use aqua_core::config::{self, ConfigReader};
use aqua_install::{self as install, InstallParams, OsLinker};

use crate::cli::InstallArgs;
use crate::controller::Container;

pub async fn run(args: InstallArgs, config: Option<&Path>) -> Result<()> {
    let container = Container::new(config.map(Path::to_path_buf))?;
    let wd = std::env::current_dir().context("get the working directory")?;

    let cfg_path = config::find(
        &wd,
        container.param.config_file_path.as_deref(),
        &container.param.global_config_paths,
    )?;
    let cfg = ConfigReader::new().read(&cfg_path)?;

    install::ensure_proxy(&container.param.root_dir, &container.runtime)?;
    if container.runtime.is_windows() {
        // one-time migration; afterwards the sentinel keeps shims as hard links
        install::replace_with_hardlinks(&OsLinker, &container.param.root_dir)?;
    }

    let which = container.which_controller();
    let plans = which.resolve_all(&cfg, &cfg_path).await?;

    if args.link_only {
        for plan in &plans {
            for file in plan.package_info.file_list() {
                install::create_proxy_link(
                    &OsLinker,
                    &container.param.root_dir,
                    &container.runtime,
                    &file.name,
                )?;
            }
        }
        return Ok(());
    }

    let checksum_file = Checksums::file_path(&cfg_path);
    let checksums = if cfg.checksum_enabled() || checksum_file.is_file() {
        Some(Mutex::new(Checksums::load(&checksum_file)?))
    } else {
        None
    };
    let require_checksum = cfg.require_checksum();

    let params: Vec<InstallParams<'_>> = plans
        .iter()
        .map(|plan| InstallParams {
            plan,
            checksums: checksums.as_ref(),
            require_checksum,
        })
        .collect();
    let result = container.package_installer.install_packages(params).await;

    if let Some(checksums) = checksums {
        checksums.lock().await.update_file(&checksum_file)?;
    }
    result?;

    info!(packages = plans.len(), "installed the workspace packages");
    Ok(())
}
