//! Per-invocation parameters assembled from the process environment
//!
//! Every aqua invocation builds one `Param` up front and threads it through
//! the controllers; nothing else reads the environment for these knobs.

use std::path::PathBuf;

use crate::error::Result;
use crate::util;

/// Default cap on concurrent registry fetches and package installs
pub const DEFAULT_MAX_PARALLELISM: usize = 5;

/// Resolved invocation parameters
#[derive(Debug, Clone)]
pub struct Param {
    /// Cache root (`AQUA_ROOT_DIR`, default `~/.local/share/aquaproj-aqua`)
    pub root_dir: PathBuf,
    /// Explicit workspace config (`AQUA_CONFIG`), if any
    pub config_file_path: Option<PathBuf>,
    /// Fallback global configs (`AQUA_GLOBAL_CONFIG`, OS path-list separator)
    pub global_config_paths: Vec<PathBuf>,
    /// Concurrency cap (`AQUA_MAX_PARALLELISM`, default 5)
    pub max_parallelism: usize,
    /// Replace the process on exec (`AQUA_EXPERIMENTAL_X_SYS_EXEC=true`)
    pub x_sys_exec: bool,
    /// Policy file (`AQUA_SECURITY_CONFIG`), if any
    pub policy_config_path: Option<PathBuf>,
}

impl Param {
    /// Build parameters from the process environment
    pub fn from_env() -> Result<Self> {
        let root_dir = match std::env::var("AQUA_ROOT_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => util::home_dir()?
                .join(".local")
                .join("share")
                .join("aquaproj-aqua"),
        };

        let max_parallelism = std::env::var("AQUA_MAX_PARALLELISM")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_PARALLELISM);

        Ok(Self {
            root_dir,
            config_file_path: non_empty_env("AQUA_CONFIG").map(PathBuf::from),
            global_config_paths: parse_global_config_paths(
                &std::env::var("AQUA_GLOBAL_CONFIG").unwrap_or_default(),
            ),
            max_parallelism,
            x_sys_exec: std::env::var("AQUA_EXPERIMENTAL_X_SYS_EXEC").as_deref() == Ok("true"),
            policy_config_path: non_empty_env("AQUA_SECURITY_CONFIG").map(PathBuf::from),
        })
    }

    /// The directory holding the proxy links
    pub fn bin_dir(&self) -> PathBuf {
        self.root_dir.join("bin")
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Split an `AQUA_GLOBAL_CONFIG` value into paths, dropping empties and
/// duplicates while preserving order
pub fn parse_global_config_paths(value: &str) -> Vec<PathBuf> {
    let mut seen = std::collections::HashSet::new();
    std::env::split_paths(value)
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
