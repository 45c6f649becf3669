//! Component wiring
//!
//! One [`Container`] is assembled per invocation from the configuration and
//! environment; every component receives its dependencies explicitly. There
//! are no globals beyond the immutable runtime probe. A shared cancellation
//! token, tripped by Ctrl-C, makes in-flight downloads and retry loops fail
//! with a clean `Cancelled` error instead of dying mid-write.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use aqua_core::{Param, Runtime};
use aqua_download::Downloader;
use aqua_install::{
    CommandVerifier, ExecController, OsLinker, PackageInstaller, RegistryInstaller,
    WhichController,
};

/// All components of one invocation
pub struct Container {
    pub param: Param,
    pub runtime: Runtime,
    pub registry_installer: Arc<RegistryInstaller>,
    pub package_installer: Arc<PackageInstaller>,
    pub shutdown: CancellationToken,
}

impl Container {
    /// Build the component graph from the environment
    pub fn new(explicit_config: Option<PathBuf>) -> Result<Self> {
        let mut param = Param::from_env().context("read the environment")?;
        if explicit_config.is_some() {
            param.config_file_path = explicit_config;
        }
        let runtime = Runtime::new();
        let shutdown = CancellationToken::new();
        spawn_signal_watcher(shutdown.clone());

        let downloader =
            Arc::new(Downloader::from_env().context("initialize the HTTP client")?);
        let registry_installer = Arc::new(RegistryInstaller::new(
            param.root_dir.clone(),
            param.max_parallelism,
            Arc::clone(&downloader),
            shutdown.clone(),
        ));
        let package_installer = Arc::new(PackageInstaller::new(
            param.root_dir.clone(),
            runtime.clone(),
            downloader,
            Arc::new(CommandVerifier),
            Arc::new(OsLinker),
            param.max_parallelism,
            shutdown.clone(),
        ));
        Ok(Self {
            param,
            runtime,
            registry_installer,
            package_installer,
            shutdown,
        })
    }

    pub fn which_controller(&self) -> WhichController {
        WhichController::new(
            self.param.clone(),
            self.runtime.clone(),
            Arc::clone(&self.registry_installer),
        )
    }

    pub fn exec_controller(&self) -> ExecController {
        ExecController::new(
            self.param.clone(),
            self.which_controller(),
            Arc::clone(&self.package_installer),
            self.shutdown.clone(),
        )
    }
}

/// Trip the cancellation token on Ctrl-C. The foreground child still gets
/// the signal from the terminal; this makes our own loops stop cleanly.
fn spawn_signal_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("received an interrupt; canceling the invocation");
            shutdown.cancel();
        }
    });
}
