//! Workspace configuration types (aqua.yaml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, RegistryInvalidReason, Result};
use crate::util;

/// Name of the implicit default registry
pub const STANDARD_REGISTRY_NAME: &str = "standard";

/// A parsed workspace configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, deserialize_with = "vec_or_null")]
    pub registries: Vec<Registry>,
    #[serde(default, deserialize_with = "vec_or_null")]
    pub packages: Vec<PackageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumSettings>,
}

impl Config {
    pub fn registry(&self, name: &str) -> Option<&Registry> {
        self.registries.iter().find(|r| r.name == name)
    }

    /// Whether checksum verification is enabled for this workspace
    pub fn checksum_enabled(&self) -> bool {
        self.checksum
            .as_ref()
            .and_then(|c| c.enabled)
            .unwrap_or(false)
    }

    /// Whether a missing recorded checksum aborts an install
    pub fn require_checksum(&self) -> bool {
        self.checksum
            .as_ref()
            .and_then(|c| c.require_checksum)
            .unwrap_or(false)
    }
}

/// Workspace-level checksum enforcement switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_checksum: Option<bool>,
}

/// A reference to a package from the workspace configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_registry_name")]
    pub registry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<String>,
}

impl PackageRef {
    /// Split an embedded `name@version` into the two fields.
    ///
    /// An explicit `version:` field wins over the embedded form.
    pub fn split_name_version(&mut self) {
        if let Some((name, version)) = self.name.split_once('@') {
            if self.version.is_none() && !version.is_empty() {
                self.version = Some(version.to_string());
            }
            self.name = name.to_string();
        }
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or_default()
    }

    /// The git tag used for download URLs; defaults to the version
    pub fn tag_or_version(&self) -> &str {
        self.tag.as_deref().unwrap_or_else(|| self.version())
    }
}

fn default_registry_name() -> String {
    STANDARD_REGISTRY_NAME.to_string()
}

/// A registry declaration from the workspace configuration.
///
/// The `standard` type is sugar expanded by the reader into a pinned
/// `github_content` registry; everything downstream dispatches on the
/// remaining three variants exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub source: RegistrySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistrySource {
    Standard {
        #[serde(default, rename = "ref")]
        reference: String,
    },
    Local {
        #[serde(default)]
        path: PathBuf,
    },
    GithubContent {
        #[serde(default)]
        repo_owner: String,
        #[serde(default)]
        repo_name: String,
        #[serde(default, rename = "ref")]
        reference: String,
        #[serde(default)]
        path: String,
    },
    Http {
        #[serde(default)]
        url: String,
        #[serde(default)]
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
}

impl Registry {
    /// Expand the `standard` sugar into its concrete `github_content` form,
    /// preserving the pinned ref. This is the only implicit defaulting the
    /// reader performs.
    pub fn normalize(self) -> Self {
        match self.source {
            RegistrySource::Standard { reference } => Self {
                name: if self.name.is_empty() {
                    STANDARD_REGISTRY_NAME.to_string()
                } else {
                    self.name
                },
                source: RegistrySource::GithubContent {
                    repo_owner: "aquaproj".to_string(),
                    repo_name: "aqua-registry".to_string(),
                    reference,
                    path: "registry.yaml".to_string(),
                },
            },
            _ => self,
        }
    }

    /// Validate the declaration for its type.
    ///
    /// `github_content` refs pinned to "main"/"master" are rejected: the
    /// cache path embeds the ref, so an unstable ref would silently serve
    /// stale content forever.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason| {
            Err(Error::RegistryInvalid {
                name: self.name.clone(),
                reason,
            })
        };
        if self.name.is_empty() {
            return fail(RegistryInvalidReason::NameRequired);
        }
        match &self.source {
            RegistrySource::Standard { .. } => fail(RegistryInvalidReason::InvalidType),
            RegistrySource::Local { path } => {
                if path.as_os_str().is_empty() {
                    return fail(RegistryInvalidReason::PathRequired);
                }
                Ok(())
            }
            RegistrySource::GithubContent {
                repo_owner,
                repo_name,
                reference,
                ..
            } => {
                if repo_owner.is_empty() {
                    return fail(RegistryInvalidReason::RepoOwnerRequired);
                }
                if repo_name.is_empty() {
                    return fail(RegistryInvalidReason::RepoNameRequired);
                }
                if reference.is_empty() {
                    return fail(RegistryInvalidReason::RefRequired);
                }
                if reference == "main" || reference == "master" {
                    return fail(RegistryInvalidReason::RefCannotBeMainOrMaster);
                }
                Ok(())
            }
            RegistrySource::Http { url, version, .. } => {
                if url.is_empty() {
                    return fail(RegistryInvalidReason::UrlRequired);
                }
                if version.is_empty() {
                    return fail(RegistryInvalidReason::VersionRequired);
                }
                if !url.contains("{{.Version}}") {
                    return fail(RegistryInvalidReason::UrlMustContainVersion);
                }
                Ok(())
            }
        }
    }

    /// The deterministic filesystem location of this registry's file.
    ///
    /// The path is the cache key: identical declarations always map to the
    /// identical location, so concurrent processes converge on one file.
    pub fn file_path(&self, root_dir: &Path, config_file_path: &Path) -> Result<PathBuf> {
        match &self.source {
            RegistrySource::Standard { .. } => Err(Error::RegistryInvalid {
                name: self.name.clone(),
                reason: RegistryInvalidReason::InvalidType,
            }),
            RegistrySource::Local { path } => {
                let base = config_file_path.parent().unwrap_or_else(|| Path::new("."));
                Ok(util::abs_path(base, path))
            }
            RegistrySource::GithubContent {
                repo_owner,
                repo_name,
                reference,
                path,
            } => Ok(root_dir
                .join("registries")
                .join("github_content")
                .join("github.com")
                .join(repo_owner)
                .join(repo_name)
                .join(reference)
                .join(path)),
            RegistrySource::Http { url, version, path, .. } => {
                // The URL template (not the rendered URL) identifies the
                // registry; versions nest under one template hash.
                let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
                let file_name = path
                    .as_deref()
                    .map(|p| {
                        Path::new(p)
                            .file_name()
                            .map(|f| f.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "registry.yaml".to_string())
                    })
                    .unwrap_or_else(|| "registry.yaml".to_string());
                Ok(root_dir
                    .join("registries")
                    .join("http")
                    .join(&digest[..16])
                    .join(version)
                    .join(file_name))
            }
        }
    }
}

pub(crate) fn vec_or_null<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
