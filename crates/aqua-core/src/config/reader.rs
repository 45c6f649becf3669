//! Workspace configuration reading
//!
//! Parses aqua.yaml, resolves `import:` inclusions recursively, expands the
//! `standard` registry sugar, and normalizes package references. Import
//! cycles are broken with a visited set of absolute paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::types::Config;
use crate::error::{Error, RegistryInvalidReason, Result};

/// Reads and normalizes workspace configurations
#[derive(Debug, Default)]
pub struct ConfigReader {}

impl ConfigReader {
    pub fn new() -> Self {
        Self {}
    }

    /// Read the configuration at `path`, following imports.
    pub fn read(&self, path: &Path) -> Result<Config> {
        let mut visited = HashSet::new();
        self.read_inner(path, &mut visited)
    }

    /// Read several configurations (nearest first) into one merged view.
    ///
    /// Earlier configs win on package-name collision; registry maps are
    /// unioned with the same precedence.
    pub fn read_merged(&self, paths: &[PathBuf]) -> Result<Config> {
        let mut merged = Config::default();
        let mut package_names: HashSet<String> = HashSet::new();
        let mut registry_names: HashSet<String> = HashSet::new();
        for path in paths {
            let cfg = self.read(path)?;
            if merged.checksum.is_none() {
                merged.checksum = cfg.checksum;
            }
            for registry in cfg.registries {
                if registry_names.insert(registry.name.clone()) {
                    merged.registries.push(registry);
                }
            }
            for package in cfg.packages {
                if package_names.insert(package.name.clone()) {
                    merged.packages.push(package);
                }
            }
        }
        Ok(merged)
    }

    fn read_inner(&self, path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Config> {
        let key = absolute(path);
        if !visited.insert(key) {
            return Err(Error::ImportCycle {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&content).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        cfg.registries = cfg
            .registries
            .into_iter()
            .map(|r| r.normalize())
            .collect();
        for registry in &cfg.registries {
            // Only emptiness is checked at read time; full validation
            // happens when the registry is installed.
            if let crate::config::RegistrySource::GithubContent { reference, .. } =
                &registry.source
            {
                if reference.is_empty() {
                    return Err(Error::RegistryInvalid {
                        name: registry.name.clone(),
                        reason: RegistryInvalidReason::RefRequired,
                    });
                }
            }
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut packages = Vec::with_capacity(cfg.packages.len());
        for mut package in std::mem::take(&mut cfg.packages) {
            match package.import.take() {
                Some(import) => {
                    let import_path = base.join(&import);
                    debug!(path = %import_path.display(), "reading an imported configuration");
                    let imported = self.read_inner(&import_path, visited)?;
                    packages.extend(imported.packages);
                }
                None => {
                    package.split_name_version();
                    packages.push(package);
                }
            }
        }
        cfg.packages = packages;
        Ok(cfg)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{PackageRef, Registry, RegistrySource};

    fn write_files(dir: &Path, files: &[(&str, &str)]) {
        for (name, body) in files {
            std::fs::write(dir.join(name), body).unwrap();
        }
    }

    fn standard_expanded(reference: &str) -> Registry {
        Registry {
            name: "standard".to_string(),
            source: RegistrySource::GithubContent {
                repo_owner: "aquaproj".to_string(),
                repo_name: "aqua-registry".to_string(),
                reference: reference.to_string(),
                path: "registry.yaml".to_string(),
            },
        }
    }

    #[test]
    fn test_read_normal() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            &[(
                "aqua.yaml",
                "registries:\n- type: standard\n  ref: v2.5.0\npackages:\n",
            )],
        );

        let cfg = ConfigReader::new().read(&dir.path().join("aqua.yaml")).unwrap();
        assert_eq!(cfg.registries, vec![standard_expanded("v2.5.0")]);
        assert!(cfg.packages.is_empty());
    }

    #[test]
    fn test_read_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigReader::new().read(&dir.path().join("aqua.yaml")).is_err());
    }

    #[test]
    fn test_read_import() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            &[
                (
                    "aqua.yaml",
                    "registries:\n- type: standard\n  ref: v2.5.0\npackages:\n- name: suzuki-shunsuke/ci-info@v1.0.0\n- import: aqua-installer.yaml\n",
                ),
                (
                    "aqua-installer.yaml",
                    "packages:\n- name: aquaproj/aqua-installer@v1.0.0\n",
                ),
            ],
        );

        let cfg = ConfigReader::new().read(&dir.path().join("aqua.yaml")).unwrap();
        assert_eq!(cfg.registries, vec![standard_expanded("v2.5.0")]);
        assert_eq!(
            cfg.packages,
            vec![
                PackageRef {
                    name: "suzuki-shunsuke/ci-info".to_string(),
                    registry: "standard".to_string(),
                    version: Some("v1.0.0".to_string()),
                    ..Default::default()
                },
                PackageRef {
                    name: "aquaproj/aqua-installer".to_string(),
                    registry: "standard".to_string(),
                    version: Some("v1.0.0".to_string()),
                    ..Default::default()
                },
            ]
        );
    }

    #[test]
    fn test_read_import_cycle() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            &[
                ("aqua.yaml", "packages:\n- import: a.yaml\n"),
                ("a.yaml", "packages:\n- import: b.yaml\n"),
                ("b.yaml", "packages:\n- import: a.yaml\n"),
            ],
        );

        let err = ConfigReader::new()
            .read(&dir.path().join("aqua.yaml"))
            .unwrap_err();
        assert!(matches!(err, Error::ImportCycle { .. }));
    }

    #[test]
    fn test_read_missing_ref() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            &[(
                "aqua.yaml",
                "registries:\n- type: github_content\n  name: custom\n  repo_owner: foo\n  repo_name: bar\n  path: registry.yaml\npackages:\n",
            )],
        );

        let err = ConfigReader::new()
            .read(&dir.path().join("aqua.yaml"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RegistryInvalid {
                reason: RegistryInvalidReason::RefRequired,
                ..
            }
        ));
    }

    #[test]
    fn test_read_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), &[("aqua.yaml", "registries: {{{{")]);
        let err = ConfigReader::new()
            .read(&dir.path().join("aqua.yaml"))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_read_merged_earlier_wins() {
        let near = tempfile::tempdir().unwrap();
        let far = tempfile::tempdir().unwrap();
        write_files(
            near.path(),
            &[(
                "aqua.yaml",
                "registries:\n- type: standard\n  ref: v2.5.0\npackages:\n- name: cli/cli@v2.4.0\n",
            )],
        );
        write_files(
            far.path(),
            &[(
                "aqua.yaml",
                "registries:\n- type: standard\n  ref: v2.0.0\npackages:\n- name: cli/cli@v1.0.0\n- name: junegunn/fzf@v0.30.0\n",
            )],
        );

        let cfg = ConfigReader::new()
            .read_merged(&[near.path().join("aqua.yaml"), far.path().join("aqua.yaml")])
            .unwrap();

        assert_eq!(cfg.registries, vec![standard_expanded("v2.5.0")]);
        assert_eq!(cfg.packages.len(), 2);
        assert_eq!(cfg.packages[0].name, "cli/cli");
        assert_eq!(cfg.packages[0].version.as_deref(), Some("v2.4.0"));
        assert_eq!(cfg.packages[1].name, "junegunn/fzf");
    }

    #[test]
    fn test_parse_serialize_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            &[(
                "aqua.yaml",
                "registries:\n- type: standard\n  ref: v2.5.0\npackages:\n- name: cli/cli@v2.4.0\n",
            )],
        );
        let reader = ConfigReader::new();
        let cfg = reader.read(&dir.path().join("aqua.yaml")).unwrap();

        let serialized = serde_yaml::to_string(&cfg).unwrap();
        std::fs::write(dir.path().join("round.yaml"), &serialized).unwrap();
        let reparsed = reader.read(&dir.path().join("round.yaml")).unwrap();
        assert_eq!(cfg, reparsed);
    }
}
