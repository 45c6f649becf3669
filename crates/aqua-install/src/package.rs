//! Package installation
//!
//! Materializes a package plan on disk: download (streaming, digesting as
//! bytes arrive), verify, extract into a temporary directory, atomically
//! promote into the content-addressed cache, and plant proxy links.
//! Concurrent installers racing on one plan are serialized with an advisory
//! file lock; the winner extracts, losers find the result in place.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs4::FileExt;
use futures_util::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use aqua_archive::ArchiveFile;
use aqua_core::checksum::{Checksums, Digester};
use aqua_core::error::{Error, Result};
use aqua_core::registry::PackageType;
use aqua_core::template;
use aqua_core::util;
use aqua_core::Runtime;
use aqua_download::Downloader;

use crate::link::{self, Linker};
use crate::verify::{SignatureVerifier, VerifyRequest};
use crate::which::PackagePlan;

/// Installs package artifacts into the cache
pub struct PackageInstaller {
    root_dir: PathBuf,
    runtime: Runtime,
    downloader: Arc<Downloader>,
    verifier: Arc<dyn SignatureVerifier>,
    linker: Arc<dyn Linker>,
    max_parallelism: usize,
    shutdown: CancellationToken,
}

/// Parameters of one package installation
pub struct InstallParams<'a> {
    pub plan: &'a PackagePlan,
    pub checksums: Option<&'a Mutex<Checksums>>,
    pub require_checksum: bool,
}

impl PackageInstaller {
    pub fn new(
        root_dir: PathBuf,
        runtime: Runtime,
        downloader: Arc<Downloader>,
        verifier: Arc<dyn SignatureVerifier>,
        linker: Arc<dyn Linker>,
        max_parallelism: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            root_dir,
            runtime,
            downloader,
            verifier,
            linker,
            max_parallelism,
            shutdown,
        }
    }

    /// Install a batch of packages concurrently.
    ///
    /// Unlike registries, package errors don't cancel the batch: every
    /// install runs, failures are logged, and the first error is returned
    /// so the command exits non-zero.
    pub async fn install_packages(&self, params: Vec<InstallParams<'_>>) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let futures = params.into_iter().map(|p| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.map_err(|_| Error::Cancelled)?;
                let name = p.plan.package.name.clone();
                let version = p.plan.version.clone();
                self.install_package(&p).await.map_err(|e| {
                    error!(package = name, version, error = %e, "failed to install a package");
                    e
                })
            }
        });
        let results = futures_util::future::join_all(futures).await;
        results.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    /// Install one package; a no-op when the executable is already in place
    pub async fn install_package(&self, params: &InstallParams<'_>) -> Result<()> {
        let plan = params.plan;
        if util::is_executable_file(&plan.exe_path) {
            debug!(
                package = plan.package.name,
                version = plan.version,
                "the package is already installed"
            );
            self.ensure_links(plan)?;
            return Ok(());
        }

        // Serialize against sibling shims installing the same plan.
        let _lock = acquire_install_lock(&plan.install_dir).await?;
        if util::is_executable_file(&plan.exe_path) {
            self.ensure_links(plan)?;
            return Ok(());
        }

        info!(
            package = plan.package.name,
            version = plan.version,
            registry = plan.registry_name,
            "installing a package"
        );

        let parent = plan
            .install_dir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let tmp_dir = parent.join(".tmp").join(&plan.version);
        // leftovers of a previous crashed install
        let _ = std::fs::remove_dir_all(&tmp_dir);
        std::fs::create_dir_all(&tmp_dir)?;

        // Cancellation aborts the in-flight download/extract; the staging
        // directory is still rolled back below.
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
            result = self.acquire_and_extract(params, &tmp_dir) => result,
        };
        let _ = std::fs::remove_dir_all(&tmp_dir);
        let _ = std::fs::remove_dir(parent.join(".tmp"));
        result?;

        if plan.exe_path.exists() && !util::is_executable_file(&plan.exe_path) {
            util::make_executable(&plan.exe_path)?;
        }
        self.ensure_links(plan)?;
        Ok(())
    }

    async fn acquire_and_extract(&self, params: &InstallParams<'_>, tmp_dir: &Path) -> Result<()> {
        let plan = params.plan;
        let artifact_name = plan.artifact_name();
        let artifact_path = tmp_dir.join(&artifact_name);

        let digest = self.download_artifact(plan, &artifact_path).await?;
        self.verify_checksum(params, &digest).await?;
        self.verify_signatures(plan, &artifact_path).await?;

        let extract_dir = tmp_dir.join("extract");
        aqua_archive::unarchive(
            &ArchiveFile {
                path: &artifact_path,
                name: &artifact_name,
                format: plan.format,
            },
            &extract_dir,
        )?;

        promote(&extract_dir, &plan.install_dir)
    }

    /// Stream the artifact to disk, digesting chunks as they arrive
    async fn download_artifact(&self, plan: &PackagePlan, dest: &Path) -> Result<String> {
        let info = &plan.package_info;
        let algorithm = info.checksum_algorithm();
        let tag = plan.package.tag_or_version();

        match info.pkg_type {
            PackageType::GithubContent => {
                let owner = info.repo_owner.as_deref().unwrap_or_default();
                let repo = info.repo_name.as_deref().unwrap_or_default();
                let path = plan.asset.as_deref().unwrap_or_default();
                let bytes = self
                    .downloader
                    .github_content_file(owner, repo, tag, path)
                    .await?;
                std::fs::write(dest, &bytes)?;
                Ok(aqua_core::checksum::digest_bytes(algorithm, &bytes))
            }
            PackageType::GoInstall => Err(Error::download(
                plan.package.name.clone(),
                "go_install packages require building from source, which aqua doesn't do",
            )),
            _ => {
                let (response, _) = match info.pkg_type {
                    PackageType::GithubRelease => {
                        let owner = info.repo_owner.as_deref().unwrap_or_default();
                        let repo = info.repo_name.as_deref().unwrap_or_default();
                        let asset = plan.asset.as_deref().unwrap_or_default();
                        self.downloader.release_asset(owner, repo, tag, asset).await?
                    }
                    PackageType::GithubArchive => {
                        let owner = info.repo_owner.as_deref().unwrap_or_default();
                        let repo = info.repo_name.as_deref().unwrap_or_default();
                        self.downloader.github_archive(owner, repo, tag).await?
                    }
                    _ => {
                        let url = plan.url.as_deref().unwrap_or_default();
                        self.downloader.http_get(url).await?
                    }
                };

                let url = response.url().to_string();
                let mut file = std::fs::File::create(dest)?;
                let mut digester = Digester::new(algorithm);
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| Error::download(&url, e))?;
                    digester.update(&chunk);
                    file.write_all(&chunk)?;
                }
                Ok(digester.finalize())
            }
        }
    }

    async fn verify_checksum(&self, params: &InstallParams<'_>, digest: &str) -> Result<()> {
        let plan = params.plan;
        let key = plan.checksum_key(&self.runtime);
        match params.checksums {
            Some(checksums) => {
                let algorithm = plan.package_info.checksum_algorithm();
                checksums
                    .lock()
                    .await
                    .check(&key, algorithm, digest, params.require_checksum)
            }
            None if params.require_checksum => Err(Error::ChecksumRequired { key }),
            None => Ok(()),
        }
    }

    async fn verify_signatures(&self, plan: &PackagePlan, artifact: &Path) -> Result<()> {
        let info = &plan.package_info;
        if let Some(cosign) = &info.cosign {
            if cosign.enabled {
                let mut args = Vec::new();
                for opt in &cosign.opts {
                    args.push(template::render(opt, &plan.vars)?);
                }
                if let Some(signature) = &cosign.signature {
                    args.push("--signature".to_string());
                    args.push(template::render(signature, &plan.vars)?);
                }
                if let Some(certificate) = &cosign.certificate {
                    args.push("--certificate".to_string());
                    args.push(template::render(certificate, &plan.vars)?);
                }
                self.verifier
                    .verify(&VerifyRequest::cosign(artifact, args))
                    .await?;
            }
        }
        if let Some(slsa) = &info.slsa_provenance {
            if slsa.enabled {
                let mut args = Vec::new();
                if let Some(source_uri) = &slsa.source_uri {
                    args.push("--source-uri".to_string());
                    args.push(template::render(source_uri, &plan.vars)?);
                }
                args.push("--source-tag".to_string());
                args.push(plan.package.tag_or_version().to_string());
                self.verifier
                    .verify(&VerifyRequest::slsa(artifact, args))
                    .await?;
            }
        }
        Ok(())
    }

    /// (Re)create the proxy links for every file the package declares
    fn ensure_links(&self, plan: &PackagePlan) -> Result<()> {
        for file in plan.package_info.file_list() {
            link::create_proxy_link(
                self.linker.as_ref(),
                &self.root_dir,
                &self.runtime,
                &file.name,
            )?;
        }
        Ok(())
    }
}

/// Atomically promote an extracted directory into its final location.
///
/// A rename failure because another process won the race is success.
fn promote(extract_dir: &Path, install_dir: &Path) -> Result<()> {
    if let Some(parent) = install_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(extract_dir, install_dir) {
        Ok(()) => Ok(()),
        Err(_) if install_dir.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Take the per-plan advisory lock; blocks until the holder releases it.
/// The lock file is a sidecar of the install directory, released on drop
/// (process exit included).
async fn acquire_install_lock(install_dir: &Path) -> Result<std::fs::File> {
    let lock_path = PathBuf::from(format!("{}.install.lock", install_dir.display()));
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)?;
    tokio::task::spawn_blocking(move || {
        file.lock_exclusive()?;
        Ok::<_, std::io::Error>(file)
    })
    .await
    .map_err(|_| Error::Cancelled)?
    .map_err(Error::from)
}
