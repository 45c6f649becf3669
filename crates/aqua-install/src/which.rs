//! Package resolution ("which")
//!
//! Maps an invoked executable name to a fully-templated package plan for
//! the current runtime: overrides applied, asset/url/file templates
//! rendered, install and exec paths computed. Configurations are consulted
//! nearest first, so the closest declaration of a name wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use aqua_archive::Format;
use aqua_core::checksum::Checksums;
use aqua_core::config::{self, Config, ConfigReader, PackageRef};
use aqua_core::error::{Error, Result};
use aqua_core::registry::{FileSpec, PackageInfo, PackageType};
use aqua_core::template::{self, Vars};
use aqua_core::util;
use aqua_core::{Param, Runtime};

use crate::registry::RegistryInstaller;

/// A resolved, fully-templated package for the current runtime
#[derive(Debug, Clone)]
pub struct PackagePlan {
    pub package: PackageRef,
    /// Package definition with override layers applied
    pub package_info: PackageInfo,
    pub registry_name: String,
    pub version: String,
    pub exe_name: String,
    /// Rendered asset name (github_release) or content path (github_content)
    pub asset: Option<String>,
    /// Rendered download URL (http packages)
    pub url: Option<String>,
    pub format: Format,
    pub install_dir: PathBuf,
    pub exe_path: PathBuf,
    /// Path of the executable inside the extracted archive
    pub file_src: String,
    pub link_name: String,
    /// Template variables the plan was rendered with
    pub vars: Vars,
}

impl PackagePlan {
    /// The downloaded artifact's file name
    pub fn artifact_name(&self) -> String {
        match &self.asset {
            Some(asset) => Path::new(asset)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| asset.clone()),
            None => match &self.url {
                Some(url) => url.rsplit('/').next().unwrap_or(url).to_string(),
                None => format!("{}.tar.gz", self.version),
            },
        }
    }

    /// Key of this artifact in the workspace checksum file
    pub fn checksum_key(&self, rt: &Runtime) -> String {
        Checksums::package_key(
            &self.registry_name,
            &self.package.name,
            &self.version,
            &rt.os,
            &rt.arch,
            &self.artifact_name(),
        )
    }

    /// Whether the package declares any signature verification
    pub fn has_signature(&self) -> bool {
        self.package_info.cosign.as_ref().is_some_and(|c| c.enabled)
            || self
                .package_info
                .slsa_provenance
                .as_ref()
                .is_some_and(|s| s.enabled)
    }
}

/// Result of resolving an executable name
#[derive(Debug)]
pub struct FindResult {
    /// The matched package, or None for passthrough
    pub plan: Option<PackagePlan>,
    pub exe_path: PathBuf,
    pub config_file_path: Option<PathBuf>,
    pub config: Option<Config>,
}

/// Resolves executables against the configured registries
pub struct WhichController {
    param: Param,
    runtime: Runtime,
    reader: ConfigReader,
    registry_installer: Arc<RegistryInstaller>,
}

impl WhichController {
    pub fn new(
        param: Param,
        runtime: Runtime,
        registry_installer: Arc<RegistryInstaller>,
    ) -> Self {
        Self {
            param,
            runtime,
            reader: ConfigReader::new(),
            registry_installer,
        }
    }

    /// Find the package providing `exe_name`, or fall through to the
    /// inherited PATH (minus our own bin directory).
    pub async fn which(&self, wd: &Path, exe_name: &str) -> Result<FindResult> {
        let mut candidates =
            config::finds(wd, self.param.config_file_path.as_deref());
        for global in &self.param.global_config_paths {
            if global.is_file() {
                candidates.push(global.clone());
            }
        }

        for cfg_path in &candidates {
            let cfg = self.reader.read(cfg_path)?;
            if let Some(plan) = self.find_in_config(&cfg, cfg_path, exe_name).await? {
                let exe_path = plan.exe_path.clone();
                return Ok(FindResult {
                    plan: Some(plan),
                    exe_path,
                    config_file_path: Some(cfg_path.clone()),
                    config: Some(cfg),
                });
            }
        }

        debug!(exe_name, "no package provides the command; falling through to PATH");
        match lookup_path(exe_name, &self.param.bin_dir()) {
            Some(exe_path) => Ok(FindResult {
                plan: None,
                exe_path,
                config_file_path: None,
                config: None,
            }),
            None => Err(Error::ExecFailed {
                exe: exe_name.to_string(),
                message: "the command isn't found".to_string(),
            }),
        }
    }

    async fn find_in_config(
        &self,
        cfg: &Config,
        cfg_path: &Path,
        exe_name: &str,
    ) -> Result<Option<PackagePlan>> {
        let checksums = if cfg.checksum_enabled() {
            Some(Checksums::load(&Checksums::file_path(cfg_path))?)
        } else {
            None
        };
        let registries = self
            .registry_installer
            .install_registries(cfg, cfg_path, checksums.as_ref())
            .await?;

        for package in &cfg.packages {
            let Some(content) = registries.get(&package.registry) else {
                warn!(
                    package = package.name,
                    registry = package.registry,
                    "the registry of the package isn't configured"
                );
                continue;
            };
            let Some(info) = content.find(&package.name) else {
                continue;
            };
            let resolved = info.resolve(&self.runtime, package.version());
            for file in resolved.file_list() {
                if file.name == exe_name {
                    return self
                        .build_plan(package, &resolved, &file)
                        .map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Resolve every package of a configuration into plans; packages that
    /// don't support the runtime are skipped with a log.
    pub async fn resolve_all(&self, cfg: &Config, cfg_path: &Path) -> Result<Vec<PackagePlan>> {
        let checksums = if cfg.checksum_enabled() {
            Some(Checksums::load(&Checksums::file_path(cfg_path))?)
        } else {
            None
        };
        let registries = self
            .registry_installer
            .install_registries(cfg, cfg_path, checksums.as_ref())
            .await?;

        let mut plans = Vec::new();
        for package in &cfg.packages {
            let Some(content) = registries.get(&package.registry) else {
                warn!(
                    package = package.name,
                    registry = package.registry,
                    "the registry of the package isn't configured"
                );
                continue;
            };
            let Some(info) = content.find(&package.name) else {
                warn!(
                    package = package.name,
                    registry = package.registry,
                    "the package isn't found in the registry"
                );
                continue;
            };
            let resolved = info.resolve(&self.runtime, package.version());
            if !resolved.supports(&self.runtime) {
                debug!(
                    package = package.name,
                    env = self.runtime.env(),
                    "skipping a package that doesn't support the environment"
                );
                continue;
            }
            let files = resolved.file_list();
            let Some(first) = files.first() else {
                continue;
            };
            plans.push(self.build_plan(package, &resolved, first)?);
        }
        Ok(plans)
    }

    /// Build the fully-templated plan for one executable of a package
    fn build_plan(
        &self,
        package: &PackageRef,
        resolved: &PackageInfo,
        file: &FileSpec,
    ) -> Result<PackagePlan> {
        let rt = &self.runtime;
        if !resolved.supports(rt) {
            return Err(Error::UnsupportedEnv {
                package: package.name.clone(),
                env: rt.env(),
            });
        }

        let version = package.version().to_string();
        let tag = package.tag_or_version().to_string();
        let os = resolved.replaced_os(rt);
        let arch = resolved.replaced_arch(rt);

        // Format is templated like the other fields, though it rarely is in
        // practice.
        let mut vars = Vars::new(rt, &tag).with_os(os).with_arch(arch);
        let format_str = match &resolved.format {
            Some(format) => template::render(format, &vars)?,
            None => String::new(),
        };
        vars = vars.with_format(format_str.clone());

        let asset = match resolved.pkg_type {
            PackageType::GithubRelease => match &resolved.asset {
                Some(asset) => Some(template::render(asset, &vars)?),
                None => {
                    return Err(Error::template(
                        package.name.clone(),
                        "asset is required for github_release packages",
                    ))
                }
            },
            PackageType::GithubContent => match &resolved.path {
                Some(path) => Some(template::render(path, &vars)?),
                None => {
                    return Err(Error::template(
                        package.name.clone(),
                        "path is required for github_content packages",
                    ))
                }
            },
            _ => None,
        };

        let url = match resolved.pkg_type {
            PackageType::Http => match &resolved.url {
                Some(url) => Some(template::render(url, &vars)?),
                None => {
                    return Err(Error::template(
                        package.name.clone(),
                        "url is required for http packages",
                    ))
                }
            },
            _ => None,
        };

        let format = resolve_format(&format_str, asset.as_deref(), url.as_deref(), resolved)?;

        let artifact_file_name = artifact_basename(asset.as_deref(), url.as_deref());
        vars = vars
            .with_file_name(file.name.clone())
            .with_asset(artifact_file_name.clone().unwrap_or_default());

        let file_src = match &file.src {
            Some(src) => template::render(src, &vars)?,
            None if format.is_raw() => artifact_file_name.unwrap_or_else(|| file.name.clone()),
            None => file.name.clone(),
        };

        let identity = package_identity(resolved);
        let install_dir = self
            .param
            .root_dir
            .join("pkgs")
            .join(&package.registry)
            .join(resolved.pkg_type.as_str())
            .join(identity)
            .join(&version);
        let exe_path = install_dir.join(&file_src);

        Ok(PackagePlan {
            package: package.clone(),
            package_info: resolved.clone(),
            registry_name: package.registry.clone(),
            version,
            exe_name: file.name.clone(),
            asset,
            url,
            format,
            install_dir,
            exe_path,
            file_src,
            link_name: file.name.clone(),
            vars,
        })
    }
}

fn artifact_basename(asset: Option<&str>, url: Option<&str>) -> Option<String> {
    if let Some(asset) = asset {
        return Path::new(asset)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned());
    }
    url.map(|u| u.rsplit('/').next().unwrap_or(u).to_string())
}

fn resolve_format(
    format_str: &str,
    asset: Option<&str>,
    url: Option<&str>,
    info: &PackageInfo,
) -> Result<Format> {
    if !format_str.is_empty() {
        return Format::parse(format_str).ok_or_else(|| {
            Error::extract(
                info.package_name(),
                format!("unsupported archive format: {format_str}"),
            )
        });
    }
    if info.pkg_type == PackageType::GithubArchive {
        return Ok(Format::TarGz);
    }
    match artifact_basename(asset, url) {
        Some(name) => Ok(Format::detect(&name)),
        None => Ok(Format::Raw),
    }
}

/// The path segment identifying a package inside `pkgs/<registry>/<type>/`
fn package_identity(info: &PackageInfo) -> PathBuf {
    match info.pkg_type {
        PackageType::GithubRelease | PackageType::GithubContent | PackageType::GithubArchive => {
            let owner = info.repo_owner.as_deref().unwrap_or_default();
            let repo = info.repo_name.as_deref().unwrap_or_default();
            PathBuf::from("github.com").join(owner).join(repo)
        }
        PackageType::Http => {
            // like http registries: a prefix of the URL template's digest
            let url = info.url.as_deref().unwrap_or_default();
            let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
            PathBuf::from(&digest[..16])
        }
        PackageType::GoInstall => PathBuf::from(info.package_name().replace('/', "__")),
    }
}

/// Look an executable up on PATH, skipping our own bin directory
pub fn lookup_path(exe_name: &str, exclude: &Path) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&paths) {
        if dir.as_os_str().is_empty() || dir == exclude {
            continue;
        }
        let candidate = dir.join(exe_name);
        if util::is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}
