//! The shim core: resolve, lazy-install, execute
//!
//! This is what runs when a proxy link is invoked. The executable name is
//! resolved to a plan, the package is installed if missing, and the process
//! hands off to the real binary. Short bounded retry loops absorb races
//! with sibling shims that are installing the same package concurrently;
//! shutdown cancellation aborts the loops with [`Error::Cancelled`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use aqua_core::checksum::Checksums;
use aqua_core::error::{Error, Result};
use aqua_core::policy::PolicyConfig;
use aqua_core::util;
use aqua_core::Param;

use crate::package::{InstallParams, PackageInstaller};
use crate::which::{FindResult, PackagePlan, WhichController};

const WAIT_RETRIES: usize = 10;
const WAIT_INTERVAL: Duration = Duration::from_millis(10);

/// Sleep between retries, aborting when the invocation is canceled
async fn wait(shutdown: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = shutdown.cancelled() => Err(Error::Cancelled),
    }
}

/// A spawn attempt that produced no usable exit code: the process never
/// started, or it was terminated by a signal before exiting
#[derive(Debug)]
struct SpawnFailed {
    message: String,
}

/// Runs a resolved executable, either replacing the process or spawning
pub struct Executor {
    x_sys_exec: bool,
    shutdown: CancellationToken,
}

impl Executor {
    pub fn new(x_sys_exec: bool, shutdown: CancellationToken) -> Self {
        Self {
            x_sys_exec,
            shutdown,
        }
    }

    /// Execute with the start-failure retry loop; returns the child's exit
    /// code.
    ///
    /// A spawn failure (including a signal-terminated child) is retried up
    /// to 10 times at 10 ms, unless the invocation was canceled.
    pub async fn exec_with_retry(&self, exe_path: &Path, args: &[String]) -> Result<i32> {
        for retry in 0..WAIT_RETRIES {
            debug!(exe_path = %exe_path.display(), retry, "executing the command");
            let failed = if self.x_sys_exec {
                // exec_replace only returns on failure
                let err = exec_replace(exe_path, args);
                SpawnFailed {
                    message: format!("call execve(2): {err}"),
                }
            } else {
                match self.spawn(exe_path, args).await {
                    Ok(code) => return Ok(code),
                    Err(failed) => failed,
                }
            };
            if self.shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!(
                exe_path = %exe_path.display(),
                retry_count = retry + 1,
                error = failed.message,
                "the process isn't started; retrying"
            );
            wait(&self.shutdown, WAIT_INTERVAL).await?;
        }
        Err(Error::ExecFailed {
            exe: exe_path.display().to_string(),
            message: "it failed to start the process".to_string(),
        })
    }

    /// Spawn the child with inherited stdio and wait for it
    async fn spawn(&self, exe_path: &Path, args: &[String]) -> std::result::Result<i32, SpawnFailed> {
        let status = tokio::process::Command::new(exe_path)
            .args(args)
            .status()
            .await
            .map_err(|e| SpawnFailed {
                message: e.to_string(),
            })?;
        exit_code(status)
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> std::result::Result<i32, SpawnFailed> {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => Ok(code),
        None => Err(SpawnFailed {
            message: match status.signal() {
                Some(signal) => format!("the process was terminated by signal {signal}"),
                None => "the process didn't exit".to_string(),
            },
        }),
    }
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> std::result::Result<i32, SpawnFailed> {
    Ok(status.code().unwrap_or(1))
}

/// Replace the current process image (unix only)
#[cfg(unix)]
fn exec_replace(exe_path: &Path, args: &[String]) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    std::process::Command::new(exe_path).args(args).exec()
}

#[cfg(not(unix))]
fn exec_replace(_exe_path: &Path, _args: &[String]) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process replacement isn't supported on this platform",
    )
}

/// The exec controller wiring which, install, policy and the executor
pub struct ExecController {
    param: Param,
    which: WhichController,
    installer: Arc<PackageInstaller>,
    executor: Executor,
    shutdown: CancellationToken,
}

impl ExecController {
    pub fn new(
        param: Param,
        which: WhichController,
        installer: Arc<PackageInstaller>,
        shutdown: CancellationToken,
    ) -> Self {
        let executor = Executor::new(param.x_sys_exec, shutdown.clone());
        Self {
            param,
            which,
            installer,
            executor,
            shutdown,
        }
    }

    /// Resolve `exe_name`, install its package if needed, and execute it
    /// with `args`. Returns the child's exit code.
    pub async fn exec(&self, wd: &Path, exe_name: &str, args: &[String]) -> Result<i32> {
        let find_result = self.which.which(wd, exe_name).await?;
        if let Some(plan) = &find_result.plan {
            debug!(
                package = plan.package.name,
                package_version = plan.version,
                exe_path = %find_result.exe_path.display(),
                "the command is provided by a package"
            );
            self.check_policy(plan)?;
            self.install(&find_result, plan).await?;
            self.wait_for_exe(&find_result.exe_path).await?;
        }
        self.executor
            .exec_with_retry(&find_result.exe_path, args)
            .await
    }

    fn check_policy(&self, plan: &PackagePlan) -> Result<()> {
        let Some(policy_path) = &self.param.policy_config_path else {
            return Ok(());
        };
        let policy = PolicyConfig::read(policy_path)?;
        policy.check(&plan.registry_name, &plan.package.name, &plan.version)?;
        if policy.require_signature && !plan.has_signature() {
            return Err(Error::PolicyDenied {
                registry: plan.registry_name.clone(),
                package: plan.package.name.clone(),
                version: plan.version.clone(),
            });
        }
        Ok(())
    }

    async fn install(&self, find_result: &FindResult, plan: &PackagePlan) -> Result<()> {
        let checksum_enabled = find_result
            .config
            .as_ref()
            .is_some_and(|c| c.checksum_enabled());
        let require_checksum = find_result
            .config
            .as_ref()
            .is_some_and(|c| c.require_checksum());
        let Some(cfg_path) = &find_result.config_file_path else {
            return self
                .installer
                .install_package(&InstallParams {
                    plan,
                    checksums: None,
                    require_checksum,
                })
                .await;
        };

        let checksum_file = Checksums::file_path(cfg_path);
        let checksums = if checksum_enabled || checksum_file.is_file() {
            Some(Mutex::new(Checksums::load(&checksum_file)?))
        } else {
            None
        };

        let result = self
            .installer
            .install_package(&InstallParams {
                plan,
                checksums: checksums.as_ref(),
                require_checksum,
            })
            .await;

        // persist newly recorded digests even when the install failed later
        if let Some(checksums) = checksums {
            if let Err(e) = checksums.lock().await.update_file(&checksum_file) {
                warn!(error = %e, "failed to update the checksum file");
            }
        }
        result
    }

    /// Wait for the executable to appear; sibling shims may be mid-install
    async fn wait_for_exe(&self, exe_path: &Path) -> Result<()> {
        for retry in 0..WAIT_RETRIES {
            if util::is_executable_file(exe_path) {
                return Ok(());
            }
            debug!(
                exe_path = %exe_path.display(),
                retry_count = retry + 1,
                "the command isn't found; waiting for a lazy install"
            );
            wait(&self.shutdown, WAIT_INTERVAL).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_exit_code_clean_exit() {
        use std::os::unix::process::ExitStatusExt;
        // raw wait status: exit code in the high byte
        assert_eq!(exit_code(std::process::ExitStatus::from_raw(0)).unwrap(), 0);
        assert_eq!(
            exit_code(std::process::ExitStatus::from_raw(3 << 8)).unwrap(),
            3
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_signal_is_a_spawn_failure() {
        use std::os::unix::process::ExitStatusExt;
        // raw wait status 9: terminated by SIGKILL
        let failed = exit_code(std::process::ExitStatus::from_raw(9)).unwrap_err();
        assert!(failed.message.contains("signal 9"));
    }

    #[tokio::test]
    async fn test_wait_returns_cancelled() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let err = wait(&shutdown, Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_exec_with_retry_gives_up_on_missing_binary() {
        let executor = Executor::new(false, CancellationToken::new());
        let err = executor
            .exec_with_retry(Path::new("/definitely/not/a/binary"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecFailed { .. }));
    }

    #[tokio::test]
    async fn test_exec_with_retry_cancelled_does_not_retry() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let executor = Executor::new(false, shutdown);
        let err = executor
            .exec_with_retry(Path::new("/definitely/not/a/binary"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
