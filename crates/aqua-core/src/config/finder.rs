//! Workspace configuration discovery
//!
//! Walks from the working directory toward the filesystem root looking for
//! the first configuration file, falling back to the global configuration
//! paths. `finds` returns every ancestor's config so callers can layer them
//! (nearest first).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Recognized file names, in precedence order within one directory
pub const CONFIG_FILE_NAMES: [&str; 4] = ["aqua.yaml", "aqua.yml", ".aqua.yaml", ".aqua.yml"];

/// Find the workspace configuration for `wd`.
///
/// An explicit path wins; otherwise the nearest ancestor config; otherwise
/// the first existing global config.
pub fn find(wd: &Path, explicit: Option<&Path>, globals: &[PathBuf]) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(found) = find_in_ancestors(wd) {
        return Ok(found);
    }
    for global in globals {
        if global.is_file() {
            return Ok(global.clone());
        }
    }
    Err(Error::ConfigNotFound {
        wd: wd.to_path_buf(),
    })
}

/// All configurations that apply to `wd`, nearest first.
///
/// An explicit path is prepended; ancestor configs follow in walk order.
pub fn finds(wd: &Path, explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    for dir in wd.ancestors() {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                paths.push(candidate);
            }
        }
    }
    paths
}

fn find_in_ancestors(wd: &Path) -> Option<PathBuf> {
    for dir in wd.ancestors() {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}
