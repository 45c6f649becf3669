//! Shared utility functions for the aqua crates

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of the proxy binary planted under the root directory
pub const PROXY_NAME: &str = "aqua-proxy";

/// Get the user's home directory.
///
/// Prefers the HOME environment variable over dirs::home_dir() so that
/// container setups which rewrite HOME behave consistently with the shell.
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    dirs::home_dir().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "could not determine the home directory",
        ))
    })
}

/// Whether the file mode marks the file owner-executable
#[cfg(unix)]
pub fn is_owner_executable(mode: u32) -> bool {
    mode & 0o100 != 0
}

#[cfg(not(unix))]
pub fn is_owner_executable(_mode: u32) -> bool {
    true
}

/// Check that a path exists and is an owner-executable regular file
pub fn is_executable_file(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                is_owner_executable(meta.permissions().mode())
            }
            #[cfg(not(unix))]
            {
                true
            }
        }
        _ => false,
    }
}

/// Make a file owner-executable (0755 on unix; no-op elsewhere)
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Resolve a possibly-relative path against a base directory
pub fn abs_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
