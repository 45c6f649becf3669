//! Typed GitHub REST API client
//!
//! Only the operations the pipeline needs: releases, tags, release assets,
//! file contents, and archive links. Constructed with a token for
//! authenticated calls; the anonymous fast paths in [`crate::Downloader`]
//! bypass the API entirely.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::Deserialize;

use aqua_core::error::{Error, Result};

use crate::http::HttpDownloader;

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// A GitHub release
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Find an asset id by its file name
    pub fn asset_id(&self, name: &str) -> Option<i64> {
        self.assets.iter().find(|a| a.name == name).map(|a| a.id)
    }
}

/// A release asset
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// A repository tag
#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// GitHub API client
#[derive(Debug, Clone)]
pub struct GithubApi {
    http: HttpDownloader,
    api_base: String,
    token: String,
}

impl GithubApi {
    pub fn new(http: HttpDownloader, token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
        }
    }

    /// Build a client only when a token is configured
    /// (`AQUA_GITHUB_TOKEN`, falling back to `GITHUB_TOKEN`)
    pub fn from_env(http: HttpDownloader) -> Option<Self> {
        let token = std::env::var("AQUA_GITHUB_TOKEN")
            .or_else(|_| std::env::var("GITHUB_TOKEN"))
            .ok()
            .filter(|t| !t.is_empty())?;
        Some(Self::new(http, token))
    }

    /// Point the client at a different API endpoint (tests)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn request(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        self.http
            .client()
            .get(url)
            .header("Accept", accept)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .request(url, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::download(url, e))?;
        if !response.status().is_success() {
            return Err(Error::download(
                url,
                format!("unexpected HTTP status {}", response.status()),
            ));
        }
        response.json().await.map_err(|e| Error::download(url, e))
    }

    /// Get the latest release of a repository
    pub async fn latest_release(&self, owner: &str, repo: &str) -> Result<Release> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base);
        self.get_json(&url).await
    }

    /// Get a release by its tag
    pub async fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let url = format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api_base);
        self.get_json(&url).await
    }

    /// List releases of a repository
    pub async fn list_releases(&self, owner: &str, repo: &str, per_page: usize) -> Result<Vec<Release>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/releases?per_page={per_page}",
            self.api_base
        );
        self.get_json(&url).await
    }

    /// List tags of a repository
    pub async fn list_tags(&self, owner: &str, repo: &str, per_page: usize) -> Result<Vec<Tag>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/tags?per_page={per_page}",
            self.api_base
        );
        self.get_json(&url).await
    }

    /// Download a release asset by id, following the redirect to the
    /// storage backend
    pub async fn download_release_asset(
        &self,
        owner: &str,
        repo: &str,
        asset_id: i64,
    ) -> Result<(reqwest::Response, Option<u64>)> {
        let url = format!(
            "{}/repos/{owner}/{repo}/releases/assets/{asset_id}",
            self.api_base
        );
        let response = self
            .request(&url, "application/octet-stream")
            .send()
            .await
            .map_err(|e| Error::download(&url, e))?;
        if !response.status().is_success() {
            return Err(Error::download(
                &url,
                format!("unexpected HTTP status {}", response.status()),
            ));
        }
        let length = response.content_length();
        Ok((response, length))
    }

    /// Get a file's contents at a ref via the Contents API
    pub async fn file_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{path}?ref={reference}",
            self.api_base
        );
        let content: Content = self.get_json(&url).await?;
        if content.kind != "file" {
            return Err(Error::download(
                &url,
                format!("the GitHub content must be a file, got {}", content.kind),
            ));
        }
        if content.encoding != "base64" {
            return Err(Error::download(
                &url,
                format!("unexpected content encoding {}", content.encoding),
            ));
        }
        let compact: String = content.content.split_whitespace().collect();
        BASE64_STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| Error::download(&url, e))
    }

    /// Download a repository's source tarball at a ref, following the
    /// redirect to the archive backend
    pub async fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<(reqwest::Response, Option<u64>)> {
        let url = format!("{}/repos/{owner}/{repo}/tarball/{reference}", self.api_base);
        let response = self
            .request(&url, "application/octet-stream")
            .send()
            .await
            .map_err(|e| Error::download(&url, e))?;
        if !response.status().is_success() {
            return Err(Error::download(
                &url,
                format!("unexpected HTTP status {}", response.status()),
            ));
        }
        let length = response.content_length();
        Ok((response, length))
    }
}
