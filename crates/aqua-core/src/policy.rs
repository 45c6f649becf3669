//! Policy file evaluation
//!
//! A policy file (pointed at by `AQUA_SECURITY_CONFIG`) allow-lists packages
//! by `(registry, package, version)` triples. No policy file means allow-all;
//! a present file with `enabled: false` also allows everything.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A parsed policy file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub require_signature: bool,
    #[serde(default, deserialize_with = "crate::config::vec_or_null")]
    pub packages: Vec<PolicyPackage>,
}

/// One allow-list entry. Omitted fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn default_true() -> bool {
    true
}

impl PolicyConfig {
    /// Read a policy file
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check a package against the allow-list
    pub fn check(&self, registry: &str, package: &str, version: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let allowed = self.packages.iter().any(|entry| {
            entry.registry.as_deref().map_or(true, |r| r == registry)
                && entry.name == package
                && entry
                    .version
                    .as_deref()
                    .map_or(true, |pattern| version_matches(pattern, version))
        });
        if allowed {
            Ok(())
        } else {
            Err(Error::PolicyDenied {
                registry: registry.to_string(),
                package: package.to_string(),
                version: version.to_string(),
            })
        }
    }
}

/// Match a version pattern: `*` matches anything, a semver range is
/// evaluated, anything else compares literally.
fn version_matches(pattern: &str, version: &str) -> bool {
    if pattern == "*" || pattern == version {
        return true;
    }
    let Ok(req) = semver::VersionReq::parse(pattern) else {
        return false;
    };
    let bare = version.strip_prefix('v').unwrap_or(version);
    semver::Version::parse(bare)
        .map(|v| req.matches(&v))
        .unwrap_or(false)
}
