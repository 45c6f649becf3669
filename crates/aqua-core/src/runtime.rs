//! Runtime environment probe
//!
//! Detects the OS and CPU architecture using Go-style names ("darwin",
//! "amd64", ...) because registry files template against those names.
//! `AQUA_GOOS` / `AQUA_GOARCH` override detection, which the test suite
//! relies on for cross-platform assertions.

/// Detected (or overridden) OS and architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    pub os: String,
    pub arch: String,
}

impl Runtime {
    /// Probe the current runtime, honoring environment overrides
    pub fn new() -> Self {
        Self {
            os: std::env::var("AQUA_GOOS").unwrap_or_else(|_| probe_os().to_string()),
            arch: std::env::var("AQUA_GOARCH").unwrap_or_else(|_| probe_arch().to_string()),
        }
    }

    /// Construct a fixed runtime, bypassing detection
    pub fn with(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The `os/arch` pair as a single string (e.g. "linux/amd64")
    pub fn env(&self) -> String {
        format!("{}/{}", self.os, self.arch)
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Executable file suffix for this OS ("" or ".exe")
    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() {
            ".exe"
        } else {
            ""
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn probe_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        "riscv64" => "riscv64",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_pair() {
        let rt = Runtime::with("linux", "amd64");
        assert_eq!(rt.env(), "linux/amd64");
        assert!(!rt.is_windows());
        assert_eq!(rt.exe_suffix(), "");
    }

    #[test]
    fn test_windows_suffix() {
        let rt = Runtime::with("windows", "arm64");
        assert!(rt.is_windows());
        assert_eq!(rt.exe_suffix(), ".exe");
    }

    #[test]
    fn test_probe_uses_go_names() {
        let os = probe_os();
        assert_ne!(os, "macos");
        let arch = probe_arch();
        assert_ne!(arch, "x86_64");
        assert_ne!(arch, "aarch64");
    }
}
