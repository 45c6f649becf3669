//! Integration tests for the download backends using a mock HTTP server

use aqua_core::error::Error;
use aqua_download::{Downloader, GithubApi, HttpDownloader};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader_without_token(server: &MockServer) -> Downloader {
    let http = HttpDownloader::new().unwrap();
    Downloader::new(http, None)
        .with_github_base(server.uri())
        .with_raw_content_base(server.uri())
}

fn downloader_with_token(server: &MockServer) -> Downloader {
    let http = HttpDownloader::new().unwrap();
    let github = GithubApi::new(http.clone(), "test-token").with_api_base(server.uri());
    Downloader::new(http, Some(github))
        .with_github_base(server.uri())
        .with_raw_content_base(server.uri())
}

#[tokio::test]
async fn test_http_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registry/v1.0.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"packages:\n".to_vec()))
        .mount(&server)
        .await;

    let downloader = downloader_without_token(&server);
    let (response, length) = downloader
        .http_get(&format!("{}/registry/v1.0.0/registry.yaml", server.uri()))
        .await
        .unwrap();
    assert_eq!(length, Some(10));
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"packages:\n");
}

#[tokio::test]
async fn test_http_get_failure_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let downloader = downloader_without_token(&server);
    let err = downloader
        .http_get(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DownloadFailed { .. }));
}

#[tokio::test]
async fn test_release_asset_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cli/cli/releases/download/v2.4.0/gh.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"binary".to_vec()))
        .mount(&server)
        .await;

    let downloader = downloader_without_token(&server);
    let (response, _) = downloader
        .release_asset("cli", "cli", "v2.4.0", "gh.tar.gz")
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"binary");
}

// The anonymous release URL 404s; the Releases API resolves the asset id and
// serves the body.
#[tokio::test]
async fn test_release_asset_falls_back_to_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cli/cli/releases/download/v2.4.0/gh.tar.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/cli/cli/releases/tags/v2.4.0"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag_name": "v2.4.0",
            "assets": [
                {"id": 7, "name": "gh.tar.gz", "browser_download_url": "", "size": 9}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/cli/cli/releases/assets/7"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"api-asset".to_vec()))
        .mount(&server)
        .await;

    let downloader = downloader_with_token(&server);
    let (response, _) = downloader
        .release_asset("cli", "cli", "v2.4.0", "gh.tar.gz")
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"api-asset");
}

#[tokio::test]
async fn test_release_asset_fallback_requires_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cli/cli/releases/download/v2.4.0/gh.tar.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let downloader = downloader_without_token(&server);
    let err = downloader
        .release_asset("cli", "cli", "v2.4.0", "gh.tar.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GitHubTokenRequired));
}

#[tokio::test]
async fn test_github_content_file_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/aquaproj/aqua-registry/v2.16.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"foo".to_vec()))
        .mount(&server)
        .await;

    let downloader = downloader_without_token(&server);
    let body = downloader
        .github_content_file("aquaproj", "aqua-registry", "v2.16.0", "registry.yaml")
        .await
        .unwrap();
    assert_eq!(body, b"foo");
}

#[tokio::test]
async fn test_github_content_file_falls_back_to_contents_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/aquaproj/aqua-registry/v2.16.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/aquaproj/aqua-registry/contents/registry.yaml"))
        .and(query_param("ref", "v2.16.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "file",
            "encoding": "base64",
            // base64("packages:\n")
            "content": "cGFja2FnZXM6\nCg==",
        })))
        .mount(&server)
        .await;

    let downloader = downloader_with_token(&server);
    let body = downloader
        .github_content_file("aquaproj", "aqua-registry", "v2.16.0", "registry.yaml")
        .await
        .unwrap();
    assert_eq!(body, b"packages:\n");
}

#[tokio::test]
async fn test_github_content_file_fallback_requires_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/aquaproj/aqua-registry/v2.16.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let downloader = downloader_without_token(&server);
    let err = downloader
        .github_content_file("aquaproj", "aqua-registry", "v2.16.0", "registry.yaml")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GitHubTokenRequired));
}

#[tokio::test]
async fn test_github_archive_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/foo/bar/archive/refs/tags/v1.0.0.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tarball".to_vec()))
        .mount(&server)
        .await;

    let downloader = downloader_without_token(&server);
    let (response, _) = downloader
        .github_archive("foo", "bar", "v1.0.0")
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"tarball");
}
