//! Registry acquisition into the content-addressed cache
//!
//! Each registry is materialized at its deterministic path (the path is the
//! cache key); a present file is reused without touching the network.
//! Fetches are concurrency-limited and fail fast: the first error cancels
//! the rest of the group. Parsed contents are memoized per invocation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use aqua_archive::{ArchiveFile, Format};
use aqua_core::checksum::{digest_bytes, Checksums};
use aqua_core::config::{Config, Registry, RegistrySource};
use aqua_core::error::{Error, Result};
use aqua_core::registry::RegistryContent;
use aqua_core::template::{self, Vars};
use aqua_download::Downloader;

/// Acquires and caches registry contents
pub struct RegistryInstaller {
    root_dir: PathBuf,
    max_parallelism: usize,
    downloader: Arc<Downloader>,
    contents: Mutex<HashMap<PathBuf, Arc<RegistryContent>>>,
    shutdown: CancellationToken,
}

impl RegistryInstaller {
    pub fn new(
        root_dir: PathBuf,
        max_parallelism: usize,
        downloader: Arc<Downloader>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            root_dir,
            max_parallelism,
            downloader,
            contents: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Install every registry declared by a configuration.
    ///
    /// All-or-nothing: the first failure cancels the in-flight group and
    /// propagates.
    pub async fn install_registries(
        &self,
        cfg: &Config,
        cfg_path: &Path,
        checksums: Option<&Checksums>,
    ) -> Result<HashMap<String, Arc<RegistryContent>>> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let futures = cfg.registries.iter().map(|registry| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.map_err(|_| Error::Cancelled)?;
                let content = self.install_registry(registry, cfg_path, checksums).await?;
                Ok::<_, Error>((registry.name.clone(), content))
            }
        });
        let results = futures_util::future::try_join_all(futures).await?;
        Ok(results.into_iter().collect())
    }

    /// Install a single registry, reusing the cached file when present
    pub async fn install_registry(
        &self,
        registry: &Registry,
        cfg_path: &Path,
        checksums: Option<&Checksums>,
    ) -> Result<Arc<RegistryContent>> {
        registry.validate()?;
        let file_path = registry.file_path(&self.root_dir, cfg_path)?;

        if let Some(content) = self.contents.lock().await.get(&file_path) {
            return Ok(Arc::clone(content));
        }

        let content = if file_path.is_file() {
            debug!(
                registry_name = registry.name,
                path = %file_path.display(),
                "reading a cached registry file"
            );
            let bytes = std::fs::read(&file_path)?;
            parse_registry(&file_path, &bytes)?
        } else {
            // cancellation drops the in-flight download
            tokio::select! {
                _ = self.shutdown.cancelled() => Err(Error::Cancelled),
                result = self.acquire(registry, &file_path, checksums) => result,
            }?
        };

        let content = Arc::new(content);
        self.contents
            .lock()
            .await
            .insert(file_path, Arc::clone(&content));
        Ok(content)
    }

    async fn acquire(
        &self,
        registry: &Registry,
        file_path: &Path,
        checksums: Option<&Checksums>,
    ) -> Result<RegistryContent> {
        match &registry.source {
            RegistrySource::Standard { .. } => unreachable!("validated before acquisition"),
            RegistrySource::Local { .. } => Err(Error::RegistryDownload {
                name: registry.name.clone(),
                url: file_path.display().to_string(),
                message: "the local registry file isn't found".to_string(),
            }),
            RegistrySource::GithubContent {
                repo_owner,
                repo_name,
                reference,
                path,
            } => {
                debug!(registry_name = registry.name, "downloading a github_content registry");
                let bytes = self
                    .downloader
                    .github_content_file(repo_owner, repo_name, reference, path)
                    .await?;
                verify_registry(checksums, &registry.name, reference, &bytes)?;
                write_registry_file(file_path, &bytes)?;
                parse_registry(file_path, &bytes)
            }
            RegistrySource::Http {
                url,
                version,
                path,
                format,
            } => {
                let vars = Vars {
                    version: version.clone(),
                    sem_ver: version.strip_prefix('v').unwrap_or(version).to_string(),
                    ..Vars::default()
                };
                let rendered = template::render(url, &vars)?;
                debug!(
                    registry_name = registry.name,
                    registry_url = rendered,
                    version,
                    "downloading an HTTP registry"
                );
                let (response, _) = self.downloader.http_get(&rendered).await?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::download(&rendered, e))?;
                verify_registry(checksums, &registry.name, version, &bytes)?;

                let bytes = match format {
                    None => bytes.to_vec(),
                    Some(format) => {
                        extract_registry_archive(file_path, format, path.as_deref(), &bytes)?
                    }
                };
                write_registry_file(file_path, &bytes)?;
                parse_registry(file_path, &bytes)
            }
        }
    }
}

/// Locate the registry file inside a downloaded archive: the configured
/// `path` exactly if set, else `registry.yaml` then `registry.yml`.
fn extract_registry_archive(
    file_path: &Path,
    format: &str,
    path: Option<&str>,
    bytes: &[u8],
) -> Result<Vec<u8>> {
    let format = Format::parse(format)
        .ok_or_else(|| Error::extract(file_path, format!("unsupported registry format: {format}")))?;

    let parent = file_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp = tempfile::tempdir_in(parent)?;
    let archive_name = format!("registry.{}", format.as_str());
    let archive_path = tmp.path().join(&archive_name);
    std::fs::write(&archive_path, bytes)?;

    let extract_dir = tmp.path().join("extract");
    aqua_archive::unarchive(
        &ArchiveFile {
            path: &archive_path,
            name: &archive_name,
            format,
        },
        &extract_dir,
    )?;

    let candidates: Vec<&str> = match path {
        Some(path) => vec![path],
        None => vec!["registry.yaml", "registry.yml"],
    };
    for candidate in &candidates {
        let full = extract_dir.join(candidate);
        if let Ok(data) = std::fs::read(&full) {
            debug!(found_path = %full.display(), "found the registry file in the archive");
            return Ok(data);
        }
    }
    Err(Error::extract(
        file_path,
        format!("the registry file isn't found in the archive (searched: {candidates:?})"),
    ))
}

fn verify_registry(
    checksums: Option<&Checksums>,
    name: &str,
    version: &str,
    bytes: &[u8],
) -> Result<()> {
    let Some(checksums) = checksums else {
        return Ok(());
    };
    let key = Checksums::registry_key(name, version);
    let Some(recorded) = checksums.get(&key) else {
        return Ok(());
    };
    let actual = digest_bytes(recorded.algorithm, bytes);
    if recorded.matches(&actual) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            key,
            expected: recorded.value.clone(),
            actual,
        })
    }
}

fn write_registry_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn parse_registry(path: &Path, bytes: &[u8]) -> Result<RegistryContent> {
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        serde_json::from_slice(bytes).map_err(|e| Error::RegistryParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    } else {
        serde_yaml::from_slice(bytes).map_err(|e| Error::RegistryParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
