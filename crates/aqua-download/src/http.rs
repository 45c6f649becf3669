//! Unauthenticated HTTP downloads

use std::time::Duration;

use aqua_core::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("aqua/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper around a shared HTTP client.
///
/// Bodies are returned as streaming responses so large artifacts never land
/// in memory; no overall deadline is applied because artifact sizes vary by
/// orders of magnitude.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::download("", e))?;
        Ok(Self { client })
    }

    /// GET a URL, returning the streaming response and its content length.
    ///
    /// Non-2xx statuses are reported as download failures.
    pub async fn download(&self, url: &str) -> Result<(reqwest::Response, Option<u64>)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download(url, e))?;
        if !response.status().is_success() {
            return Err(Error::download(
                url,
                format!("unexpected HTTP status {}", response.status()),
            ));
        }
        let length = response.content_length();
        Ok((response, length))
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
