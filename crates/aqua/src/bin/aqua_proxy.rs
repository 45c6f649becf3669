//! aqua-proxy - the shared shim binary
//!
//! One copy of this binary sits at `<root>/aqua-proxy`; every managed
//! executable under `<root>/bin/` links to it. It identifies itself by its
//! invocation name and delegates to `aqua exec`, which resolves the
//! workspace configuration and lazy-installs the package.

use std::path::{Path, PathBuf};
use std::process::exit;

fn main() {
    let mut argv = std::env::args();
    let argv0 = argv.next().unwrap_or_else(|| "aqua-proxy".to_string());
    let exe_name = Path::new(&argv0)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or(argv0.clone());
    let args: Vec<String> = argv.collect();

    let Some(aqua) = find_aqua() else {
        eprintln!("aqua-proxy: the aqua binary isn't found on PATH");
        exit(1);
    };

    let status = run(&aqua, &exe_name, &args);
    exit(status);
}

/// Locate the `aqua` binary: next to this proxy first, then PATH
fn find_aqua() -> Option<PathBuf> {
    let exe_name = format!("aqua{}", std::env::consts::EXE_SUFFIX);
    if let Ok(current) = std::env::current_exe() {
        if let Some(dir) = current.parent() {
            let sibling = dir.join(&exe_name);
            if sibling.is_file() {
                return Some(sibling);
            }
        }
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(&exe_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
fn run(aqua: &Path, exe_name: &str, args: &[String]) -> i32 {
    use std::os::unix::process::CommandExt;
    // exec only returns on failure
    let err = std::process::Command::new(aqua)
        .arg("exec")
        .arg("--")
        .arg(exe_name)
        .args(args)
        .exec();
    eprintln!("aqua-proxy: execute aqua: {err}");
    1
}

#[cfg(not(unix))]
fn run(aqua: &Path, exe_name: &str, args: &[String]) -> i32 {
    match std::process::Command::new(aqua)
        .arg("exec")
        .arg("--")
        .arg(exe_name)
        .args(args)
        .status()
    {
        Ok(status) => status.code().unwrap_or(1),
        Err(err) => {
            eprintln!("aqua-proxy: execute aqua: {err}");
            1
        }
    }
}
