//! # aqua-download
//!
//! Download backends for the resolve-install-exec pipeline: an
//! unauthenticated HTTP downloader and a typed GitHub API client, combined
//! into a [`Downloader`] that prefers anonymous fast paths and falls back to
//! the API when a token is available.

mod github;
mod http;

pub use github::{GithubApi, Release, ReleaseAsset, Tag};
pub use http::HttpDownloader;

use aqua_core::error::{Error, Result};
use tracing::debug;

const DEFAULT_GITHUB_BASE: &str = "https://github.com";
const DEFAULT_RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

/// Artifact acquisition with anonymous-first semantics.
///
/// GitHub assets and contents are fetched without authentication first
/// (release downloads are not rate limited), then retried once through the
/// API when a token is configured. Without a token the API fallback fails
/// with [`Error::GitHubTokenRequired`].
pub struct Downloader {
    http: HttpDownloader,
    github: Option<GithubApi>,
    github_base: String,
    raw_content_base: String,
}

impl Downloader {
    pub fn new(http: HttpDownloader, github: Option<GithubApi>) -> Self {
        Self {
            http,
            github,
            github_base: DEFAULT_GITHUB_BASE.to_string(),
            raw_content_base: DEFAULT_RAW_CONTENT_BASE.to_string(),
        }
    }

    /// Build from the environment: anonymous HTTP plus an API client when a
    /// token is set
    pub fn from_env() -> Result<Self> {
        let http = HttpDownloader::new()?;
        let github = GithubApi::from_env(http.clone());
        Ok(Self::new(http, github))
    }

    /// Point anonymous GitHub downloads at a different host (tests)
    pub fn with_github_base(mut self, base: impl Into<String>) -> Self {
        self.github_base = base.into();
        self
    }

    /// Point raw-content downloads at a different host (tests)
    pub fn with_raw_content_base(mut self, base: impl Into<String>) -> Self {
        self.raw_content_base = base.into();
        self
    }

    /// Plain HTTP GET of a rendered URL
    pub async fn http_get(&self, url: &str) -> Result<(reqwest::Response, Option<u64>)> {
        self.http.download(url).await
    }

    /// Download a GitHub release asset.
    ///
    /// Anonymous `github.com/<o>/<r>/releases/download/...` first; on any
    /// failure, look the asset up through the Releases API and download it
    /// by id.
    pub async fn release_asset(
        &self,
        owner: &str,
        repo: &str,
        version: &str,
        asset: &str,
    ) -> Result<(reqwest::Response, Option<u64>)> {
        let url = format!(
            "{}/{owner}/{repo}/releases/download/{version}/{asset}",
            self.github_base
        );
        let err = match self.http.download(&url).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        debug!(
            repo_owner = owner,
            repo_name = repo,
            asset_version = version,
            asset_name = asset,
            error = %err,
            "failed to download an asset from GitHub Releases without the GitHub API; trying the API"
        );
        let Some(github) = &self.github else {
            return Err(Error::GitHubTokenRequired);
        };
        let release = github.release_by_tag(owner, repo, version).await?;
        let asset_id = release.asset_id(asset).ok_or_else(|| {
            Error::download(&url, format!("the release asset isn't found: {asset}"))
        })?;
        github.download_release_asset(owner, repo, asset_id).await
    }

    /// Download a file from a repository at a ref.
    ///
    /// Anonymous raw.githubusercontent.com first; on failure, the Contents
    /// API (token required).
    pub async fn github_content_file(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
        path: &str,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{owner}/{repo}/{reference}/{path}",
            self.raw_content_base
        );
        let err = match self.http.download(&url).await {
            Ok((response, _)) => match response.bytes().await {
                Ok(bytes) => return Ok(bytes.to_vec()),
                Err(e) => Error::download(&url, e),
            },
            Err(err) => err,
        };
        debug!(
            repo_owner = owner,
            repo_name = repo,
            reference,
            path,
            error = %err,
            "failed to download a content from GitHub without the GitHub API; trying the API"
        );
        let Some(github) = &self.github else {
            return Err(Error::GitHubTokenRequired);
        };
        github.file_contents(owner, repo, path, reference).await
    }

    /// Download a repository source archive at a ref.
    ///
    /// Anonymous `github.com/<o>/<r>/archive/...` first; the API tarball
    /// link as the authenticated fallback.
    pub async fn github_archive(
        &self,
        owner: &str,
        repo: &str,
        version: &str,
    ) -> Result<(reqwest::Response, Option<u64>)> {
        let url = format!(
            "{}/{owner}/{repo}/archive/refs/tags/{version}.tar.gz",
            self.github_base
        );
        let err = match self.http.download(&url).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        debug!(
            repo_owner = owner,
            repo_name = repo,
            version,
            error = %err,
            "failed to download a source archive anonymously; trying the API"
        );
        let Some(github) = &self.github else {
            return Err(Error::GitHubTokenRequired);
        };
        github.download_archive(owner, repo, version).await
    }
}
