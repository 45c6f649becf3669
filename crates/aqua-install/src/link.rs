//! Proxy link layout
//!
//! Every managed executable gets `<root>/bin/<name>` pointing at the shared
//! proxy binary. On unix these are relative symlinks; on Windows, and on
//! every platform after the one-time `hardlink` sentinel migration, hard
//! links are used instead. Link operations sit behind the [`Linker`] trait
//! so tests can observe them without touching a real filesystem layout.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use aqua_core::error::{Error, Result};
use aqua_core::util::{self, PROXY_NAME};
use aqua_core::Runtime;

/// Sentinel file: once present, shims are hard links on every platform
pub const HARDLINK_SENTINEL: &str = "hardlink";

/// What occupies a path, as seen by `lstat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Dir,
    NamedPipe,
    Regular,
    Symlink,
    Other,
}

/// Filesystem link operations
pub trait Linker: Send + Sync {
    /// The kind of filesystem object at `path`, or None if absent
    fn kind(&self, path: &Path) -> io::Result<Option<FileKind>>;
    fn symlink(&self, dest: &Path, path: &Path) -> io::Result<()>;
    fn hardlink(&self, dest: &Path, path: &Path) -> io::Result<()>;
    fn readlink(&self, path: &Path) -> io::Result<PathBuf>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem
pub struct OsLinker;

impl Linker for OsLinker {
    fn kind(&self, path: &Path) -> io::Result<Option<FileKind>> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Dir
        } else if is_fifo(&file_type) {
            FileKind::NamedPipe
        } else if file_type.is_file() {
            FileKind::Regular
        } else {
            FileKind::Other
        };
        Ok(Some(kind))
    }

    #[cfg(unix)]
    fn symlink(&self, dest: &Path, path: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(dest, path)
    }

    #[cfg(windows)]
    fn symlink(&self, dest: &Path, path: &Path) -> io::Result<()> {
        std::os::windows::fs::symlink_file(dest, path)
    }

    fn hardlink(&self, dest: &Path, path: &Path) -> io::Result<()> {
        std::fs::hard_link(dest, path)
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

#[cfg(unix)]
fn is_fifo(file_type: &std::fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_file_type: &std::fs::FileType) -> bool {
    false
}

/// Create or reconcile a symlink at `path` pointing at `dest`.
///
/// Directories and named pipes are never clobbered; regular files are
/// replaced; an existing symlink is recreated only when its target drifted.
pub fn create_link(linker: &dyn Linker, path: &Path, dest: &Path) -> Result<()> {
    match linker.kind(path)? {
        None => {
            info!(command = %path.display(), "creating a symbolic link");
            linker.symlink(dest, path)?;
            Ok(())
        }
        Some(FileKind::Dir) => Err(Error::PathConflict {
            path: path.to_path_buf(),
            kind: "directory",
        }),
        Some(FileKind::NamedPipe) => Err(Error::PathConflict {
            path: path.to_path_buf(),
            kind: "named pipe",
        }),
        Some(FileKind::Regular) => {
            linker.remove(path)?;
            linker.symlink(dest, path)?;
            Ok(())
        }
        Some(FileKind::Symlink) => {
            let current = linker.readlink(path)?;
            if current == dest {
                return Ok(());
            }
            debug!(
                link_file = %path.display(),
                old = %current.display(),
                new = %dest.display(),
                "recreating a symbolic link"
            );
            linker.remove(path)?;
            linker.symlink(dest, path)?;
            Ok(())
        }
        Some(FileKind::Other) => Err(Error::PathConflict {
            path: path.to_path_buf(),
            kind: "unexpected file",
        }),
    }
}

/// Whether new shims should be hard links on this host
pub fn hardlinks_enabled(root_dir: &Path, rt: &Runtime) -> bool {
    rt.is_windows() || root_dir.join(HARDLINK_SENTINEL).is_file()
}

/// Ensure `<root>/bin/<name>` links to the proxy
pub fn create_proxy_link(
    linker: &dyn Linker,
    root_dir: &Path,
    rt: &Runtime,
    name: &str,
) -> Result<()> {
    let bin_dir = root_dir.join("bin");
    std::fs::create_dir_all(&bin_dir)?;
    let link_path = bin_dir.join(format!("{name}{}", rt.exe_suffix()));

    if hardlinks_enabled(root_dir, rt) {
        let proxy = root_dir.join(format!("{PROXY_NAME}{}", rt.exe_suffix()));
        create_hardlink(linker, &link_path, &proxy)
    } else {
        // relative so the root directory can be relocated
        create_link(linker, &link_path, Path::new(&format!("../{PROXY_NAME}")))
    }
}

fn create_hardlink(linker: &dyn Linker, path: &Path, dest: &Path) -> Result<()> {
    match linker.kind(path)? {
        None => {
            info!(command = %path.display(), "creating a hard link");
            linker.hardlink(dest, path)?;
            Ok(())
        }
        Some(FileKind::Dir) => Err(Error::PathConflict {
            path: path.to_path_buf(),
            kind: "directory",
        }),
        Some(FileKind::NamedPipe) => Err(Error::PathConflict {
            path: path.to_path_buf(),
            kind: "named pipe",
        }),
        Some(FileKind::Regular) if same_inode(path, dest) => Ok(()),
        Some(_) => {
            linker.remove(path)?;
            linker.hardlink(dest, path)?;
            Ok(())
        }
    }
}

#[cfg(unix)]
fn same_inode(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.ino() == mb.ino() && ma.dev() == mb.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_inode(_a: &Path, _b: &Path) -> bool {
    false
}

/// One-time migration: replace every shim in `<root>/bin` with a hard link
/// to the proxy, then drop the sentinel so later installs keep using hard
/// links.
pub fn replace_with_hardlinks(linker: &dyn Linker, root_dir: &Path) -> Result<()> {
    let sentinel = root_dir.join(HARDLINK_SENTINEL);
    if sentinel.is_file() {
        return Ok(());
    }
    let bin_dir = root_dir.join("bin");
    let proxy = root_dir.join(PROXY_NAME);
    if bin_dir.is_dir() && proxy.is_file() {
        for entry in std::fs::read_dir(&bin_dir)? {
            let path = entry?.path();
            linker.remove(&path)?;
            linker.hardlink(&proxy, &path)?;
        }
        info!("replaced the proxy links with hard links");
    }
    std::fs::write(&sentinel, b"")?;
    Ok(())
}

/// Make sure the proxy binary exists under the root directory, copying the
/// one shipped next to the current executable when needed.
pub fn ensure_proxy(root_dir: &Path, rt: &Runtime) -> Result<()> {
    let proxy = root_dir.join(format!("{PROXY_NAME}{}", rt.exe_suffix()));
    if proxy.is_file() {
        return Ok(());
    }
    std::fs::create_dir_all(root_dir)?;
    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join(format!("{PROXY_NAME}{}", rt.exe_suffix()))));
    match sibling {
        Some(src) if src.is_file() => {
            std::fs::copy(&src, &proxy)?;
            util::make_executable(&proxy)?;
            info!(path = %proxy.display(), "installed the proxy binary");
            Ok(())
        }
        _ => {
            debug!("the proxy binary isn't available next to the current executable");
            Ok(())
        }
    }
}
