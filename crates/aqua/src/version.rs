//! Version information for the aqua CLI

use serde::Serialize;

/// Version information
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    /// Semantic version
    pub version: String,

    /// Git commit SHA (short)
    pub commit: Option<String>,

    /// Target triple
    pub target: Option<String>,
}

impl VersionInfo {
    /// Create version info for the current build
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("GIT_SHA").map(String::from),
            target: option_env!("TARGET").map(String::from),
        }
    }

    /// Format as a display string
    pub fn display(&self) -> String {
        let mut parts = vec![format!("aqua {}", self.version)];
        if let Some(commit) = &self.commit {
            parts.push(format!("({commit})"));
        }
        if let Some(target) = &self.target {
            parts.push(target.clone());
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_version() {
        let info = VersionInfo::current();
        assert!(info.display().contains(env!("CARGO_PKG_VERSION")));
    }
}
