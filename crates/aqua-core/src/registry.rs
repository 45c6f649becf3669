//! Registry content: package definitions and their resolution rules
//!
//! A registry file is an ordered list of package-info records. Each record
//! describes how to download and install one tool: origin type, templated
//! asset/url fields, installed files, environment filters, and layered
//! overrides (per-OS/arch and per-version).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::Algorithm;
use crate::runtime::Runtime;

/// A parsed registry file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryContent {
    #[serde(
        rename = "packages",
        default,
        deserialize_with = "crate::config::vec_or_null"
    )]
    pub package_infos: Vec<PackageInfo>,
}

impl RegistryContent {
    /// Look up a package by name or alias
    pub fn find(&self, name: &str) -> Option<&PackageInfo> {
        self.package_infos
            .iter()
            .find(|p| p.package_name() == name)
            .or_else(|| {
                self.package_infos
                    .iter()
                    .find(|p| p.aliases.iter().any(|a| a.name == name))
            })
    }
}

/// Origin type of a package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    #[default]
    GithubRelease,
    GithubContent,
    GithubArchive,
    Http,
    GoInstall,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GithubRelease => "github_release",
            Self::GithubContent => "github_content",
            Self::GithubArchive => "github_archive",
            Self::Http => "http",
            Self::GoInstall => "go_install",
        }
    }
}

/// An executable file installed by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub name: String,
    /// Path of the file inside the extracted archive; templated.
    /// Defaults to the file name (or the asset name for raw downloads).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

/// An alternative lookup name for a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
}

/// Checksum policy declared by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
}

/// Cosign signature verification declared by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosignPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Extra arguments passed to `cosign verify-blob`; templated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

/// SLSA provenance verification declared by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlsaPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
}

/// Fields an override layer may patch; absent fields keep the prior value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacements: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_envs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosign: Option<CosignPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slsa_provenance: Option<SlsaPolicy>,
}

/// A per-OS/arch override; the first matching entry is applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Override {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goarch: Option<String>,
    #[serde(flatten)]
    pub patch: PackagePatch,
}

impl Override {
    fn matches(&self, rt: &Runtime) -> bool {
        self.goos.as_deref().map_or(true, |os| os == rt.os)
            && self.goarch.as_deref().map_or(true, |arch| arch == rt.arch)
    }
}

/// A per-version override; the first entry whose constraint matches is applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionOverride {
    #[serde(default)]
    pub version_constraint: String,
    #[serde(flatten)]
    pub patch: PackagePatch,
}

impl VersionOverride {
    fn matches(&self, version: &str) -> bool {
        let req = match semver::VersionReq::parse(&self.version_constraint) {
            Ok(req) => req,
            Err(e) => {
                debug!(
                    constraint = %self.version_constraint,
                    error = %e,
                    "skipping an unparsable version constraint"
                );
                return false;
            }
        };
        let bare = version.strip_prefix('v').unwrap_or(version);
        match semver::Version::parse(bare) {
            Ok(v) => req.matches(&v),
            Err(_) => false,
        }
    }
}

/// A single package definition from a registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(rename = "type", default)]
    pub pkg_type: PackageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Alias>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_envs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_source: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replacements: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Override>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub version_overrides: Vec<VersionOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosign: Option<CosignPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slsa_provenance: Option<SlsaPolicy>,
}

impl PackageInfo {
    /// The package's identity within its registry
    pub fn package_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match (&self.repo_owner, &self.repo_name) {
            (Some(owner), Some(repo)) => format!("{owner}/{repo}"),
            _ => self.url.clone().unwrap_or_default(),
        }
    }

    /// Apply override layers for a runtime and version.
    ///
    /// Order: base fields, then the first matching `overrides` entry, then
    /// the first matching `version_overrides` entry. Later layers replace
    /// fields one by one; absent fields retain the prior value.
    pub fn resolve(&self, rt: &Runtime, version: &str) -> PackageInfo {
        let mut resolved = self.clone();
        if let Some(entry) = self.overrides.iter().find(|o| o.matches(rt)) {
            apply_patch(&mut resolved, &entry.patch);
        }
        if let Some(entry) = self.version_overrides.iter().find(|o| o.matches(version)) {
            apply_patch(&mut resolved, &entry.patch);
        }
        resolved.overrides = Vec::new();
        resolved.version_overrides = Vec::new();
        resolved
    }

    /// Evaluate `supported_envs` against a runtime.
    ///
    /// Entries match an OS, an arch, an `os/arch` pair, or `all`; a leading
    /// `!` negates. Negations veto; otherwise any positive entry must match
    /// (an empty list supports everything).
    pub fn supports(&self, rt: &Runtime) -> bool {
        if self.supported_envs.is_empty() {
            return true;
        }
        let matches = |entry: &str| {
            entry == "all" || entry == rt.os || entry == rt.arch || entry == rt.env()
        };
        let mut has_positive = false;
        let mut positive_matched = false;
        for entry in &self.supported_envs {
            if let Some(negated) = entry.strip_prefix('!') {
                if matches(negated) {
                    return false;
                }
            } else {
                has_positive = true;
                positive_matched = positive_matched || matches(entry);
            }
        }
        !has_positive || positive_matched
    }

    /// The files this package installs; defaults to one file named after the
    /// last segment of the package name.
    pub fn file_list(&self) -> Vec<FileSpec> {
        if !self.files.is_empty() {
            return self.files.clone();
        }
        let name = self.package_name();
        let base = name.rsplit('/').next().unwrap_or(&name);
        vec![FileSpec {
            name: base.to_string(),
            src: None,
        }]
    }

    /// The digest algorithm for artifact verification
    pub fn checksum_algorithm(&self) -> Algorithm {
        self.checksum
            .as_ref()
            .map(|c| c.algorithm)
            .unwrap_or_default()
    }

    /// Rename the runtime OS per the `replacements` table
    pub fn replaced_os(&self, rt: &Runtime) -> String {
        self.replacements
            .get(&rt.os)
            .cloned()
            .unwrap_or_else(|| rt.os.clone())
    }

    /// Rename the runtime arch per the `replacements` table
    pub fn replaced_arch(&self, rt: &Runtime) -> String {
        self.replacements
            .get(&rt.arch)
            .cloned()
            .unwrap_or_else(|| rt.arch.clone())
    }
}

fn apply_patch(info: &mut PackageInfo, patch: &PackagePatch) {
    if let Some(asset) = &patch.asset {
        info.asset = Some(asset.clone());
    }
    if let Some(url) = &patch.url {
        info.url = Some(url.clone());
    }
    if let Some(path) = &patch.path {
        info.path = Some(path.clone());
    }
    if let Some(format) = &patch.format {
        info.format = Some(format.clone());
    }
    if let Some(files) = &patch.files {
        info.files = files.clone();
    }
    if let Some(replacements) = &patch.replacements {
        info.replacements = replacements.clone();
    }
    if let Some(supported_envs) = &patch.supported_envs {
        info.supported_envs = supported_envs.clone();
    }
    if let Some(checksum) = &patch.checksum {
        info.checksum = Some(checksum.clone());
    }
    if let Some(cosign) = &patch.cosign {
        info.cosign = Some(cosign.clone());
    }
    if let Some(slsa) = &patch.slsa_provenance {
        info.slsa_provenance = Some(slsa.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(yaml: &str) -> PackageInfo {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_registry_yaml() {
        let content: RegistryContent = serde_yaml::from_str(
            r#"packages:
- type: github_release
  repo_owner: cli
  repo_name: cli
  asset: gh_{{.SemVer}}_{{.OS}}_{{.Arch}}.{{.Format}}
  format: tar.gz
  files:
  - name: gh
    src: gh_{{.SemVer}}_{{.OS}}_{{.Arch}}/bin/gh
  aliases:
  - name: github-cli
"#,
        )
        .unwrap();
        assert_eq!(content.package_infos.len(), 1);
        let info = &content.package_infos[0];
        assert_eq!(info.pkg_type, PackageType::GithubRelease);
        assert_eq!(info.package_name(), "cli/cli");
        assert_eq!(info.files[0].name, "gh");
    }

    #[test]
    fn test_find_by_name_and_alias() {
        let content: RegistryContent = serde_yaml::from_str(
            "packages:\n- type: github_release\n  repo_owner: cli\n  repo_name: cli\n  aliases:\n  - name: github-cli\n",
        )
        .unwrap();
        assert!(content.find("cli/cli").is_some());
        assert!(content.find("github-cli").is_some());
        assert!(content.find("missing").is_none());
    }

    #[test]
    fn test_resolve_os_override() {
        let info = package(
            r#"type: github_release
repo_owner: cli
repo_name: cli
asset: gh_{{.OS}}.tar.gz
format: tar.gz
overrides:
- goos: windows
  format: zip
  asset: gh_{{.OS}}.zip
"#,
        );
        let linux = info.resolve(&Runtime::with("linux", "amd64"), "v1.0.0");
        assert_eq!(linux.format.as_deref(), Some("tar.gz"));

        let windows = info.resolve(&Runtime::with("windows", "amd64"), "v1.0.0");
        assert_eq!(windows.format.as_deref(), Some("zip"));
        assert_eq!(windows.asset.as_deref(), Some("gh_{{.OS}}.zip"));
        // unpatched fields survive
        assert_eq!(windows.repo_owner.as_deref(), Some("cli"));
    }

    #[test]
    fn test_resolve_first_matching_override_wins() {
        let info = package(
            r#"type: github_release
repo_owner: a
repo_name: b
overrides:
- goos: linux
  format: tar.xz
- goos: linux
  goarch: amd64
  format: zip
"#,
        );
        let resolved = info.resolve(&Runtime::with("linux", "amd64"), "v1.0.0");
        assert_eq!(resolved.format.as_deref(), Some("tar.xz"));
    }

    #[test]
    fn test_resolve_version_override_applies_after_os() {
        let info = package(
            r#"type: github_release
repo_owner: a
repo_name: b
asset: new-{{.Version}}.tar.gz
overrides:
- goos: linux
  format: tar.gz
version_overrides:
- version_constraint: "<1.0.0"
  asset: old-{{.Version}}.tar.gz
"#,
        );
        let old = info.resolve(&Runtime::with("linux", "amd64"), "v0.9.0");
        assert_eq!(old.asset.as_deref(), Some("old-{{.Version}}.tar.gz"));
        assert_eq!(old.format.as_deref(), Some("tar.gz"));

        let new = info.resolve(&Runtime::with("linux", "amd64"), "v1.2.0");
        assert_eq!(new.asset.as_deref(), Some("new-{{.Version}}.tar.gz"));
    }

    #[test]
    fn test_supports() {
        let all = package("type: github_release\nrepo_owner: a\nrepo_name: b\n");
        assert!(all.supports(&Runtime::with("linux", "amd64")));

        let darwin_only = package(
            "type: github_release\nrepo_owner: a\nrepo_name: b\nsupported_envs:\n- darwin\n",
        );
        assert!(darwin_only.supports(&Runtime::with("darwin", "arm64")));
        assert!(!darwin_only.supports(&Runtime::with("linux", "amd64")));

        let pair = package(
            "type: github_release\nrepo_owner: a\nrepo_name: b\nsupported_envs:\n- linux/amd64\n",
        );
        assert!(pair.supports(&Runtime::with("linux", "amd64")));
        assert!(!pair.supports(&Runtime::with("linux", "arm64")));

        let negated = package(
            "type: github_release\nrepo_owner: a\nrepo_name: b\nsupported_envs:\n- \"!windows\"\n",
        );
        assert!(negated.supports(&Runtime::with("linux", "amd64")));
        assert!(!negated.supports(&Runtime::with("windows", "amd64")));
    }

    #[test]
    fn test_file_list_default() {
        let info = package("type: github_release\nrepo_owner: junegunn\nrepo_name: fzf\n");
        let files = info.file_list();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "fzf");
    }

    #[test]
    fn test_replacements() {
        let info = package(
            "type: github_release\nrepo_owner: a\nrepo_name: b\nreplacements:\n  darwin: macOS\n  amd64: x86_64\n",
        );
        let rt = Runtime::with("darwin", "amd64");
        assert_eq!(info.replaced_os(&rt), "macOS");
        assert_eq!(info.replaced_arch(&rt), "x86_64");
        assert_eq!(info.replaced_os(&Runtime::with("linux", "arm64")), "linux");
    }

    #[test]
    fn test_registry_json_parse() {
        let content: RegistryContent = serde_json::from_str(
            r#"{"packages": [{"type": "http", "name": "example/tool", "url": "https://example.com/{{.Version}}/tool.tar.gz", "format": "tar.gz"}]}"#,
        )
        .unwrap();
        assert_eq!(content.package_infos[0].pkg_type, PackageType::Http);
        assert_eq!(content.package_infos[0].package_name(), "example/tool");
    }

    #[test]
    fn test_version_constraint_parse_failure_is_no_match() {
        let vo = VersionOverride {
            version_constraint: "not a constraint".to_string(),
            patch: PackagePatch::default(),
        };
        assert!(!vo.matches("v1.0.0"));
    }
}
