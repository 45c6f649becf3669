//! Registry installation against a mock HTTP server

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use aqua_core::config::{Config, Registry, RegistrySource};
use aqua_core::error::Error;
use aqua_core::registry::PackageType;
use aqua_download::{Downloader, HttpDownloader};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aqua_install::RegistryInstaller;

fn http_registry(name: &str, url: &str, version: &str, format: Option<&str>) -> Registry {
    Registry {
        name: name.to_string(),
        source: RegistrySource::Http {
            url: url.to_string(),
            version: version.to_string(),
            path: None,
            format: format.map(String::from),
        },
    }
}

fn new_installer(root: &Path) -> RegistryInstaller {
    let downloader = Arc::new(Downloader::new(HttpDownloader::new().unwrap(), None));
    RegistryInstaller::new(
        root.to_path_buf(),
        5,
        downloader,
        CancellationToken::new(),
    )
}

const REGISTRY_YAML: &str = r#"packages:
- type: github_release
  repo_owner: test-owner
  repo_name: test-repo
  asset: "test-{{.Version}}.tar.gz"
"#;

#[tokio::test]
async fn test_http_registry_direct_yaml() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registry/v1.0.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(REGISTRY_YAML.as_bytes().to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let registry = http_registry(
        "http-registry",
        &format!("{}/registry/{{{{.Version}}}}/registry.yaml", server.uri()),
        "v1.0.0",
        None,
    );
    let cfg = Config {
        registries: vec![registry.clone()],
        ..Default::default()
    };

    let contents = installer
        .install_registries(&cfg, Path::new("aqua.yaml"), None)
        .await
        .unwrap();
    let content = contents.get("http-registry").unwrap();
    assert_eq!(content.package_infos.len(), 1);
    assert_eq!(content.package_infos[0].pkg_type, PackageType::GithubRelease);
    assert_eq!(content.package_infos[0].package_name(), "test-owner/test-repo");

    // the file was cached at its deterministic path
    let cached = registry
        .file_path(root.path(), Path::new("aqua.yaml"))
        .unwrap();
    assert!(cached.is_file());

    // a second install in a fresh process reads the cache, not the network
    let second = new_installer(root.path());
    let contents = second
        .install_registries(&cfg, Path::new("aqua.yaml"), None)
        .await
        .unwrap();
    assert_eq!(contents.get("http-registry").unwrap().package_infos.len(), 1);
}

#[tokio::test]
async fn test_http_registry_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registry/v1.0.0/registry.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(
            br#"{"packages": [{"type": "github_release", "repo_owner": "a", "repo_name": "b"}]}"#
                .to_vec(),
        ))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let mut registry = http_registry(
        "http-json",
        &format!("{}/registry/{{{{.Version}}}}/registry.json", server.uri()),
        "v1.0.0",
        None,
    );
    if let RegistrySource::Http { path, .. } = &mut registry.source {
        *path = Some("registry.json".to_string());
    }

    let content = installer
        .install_registry(&registry, Path::new("aqua.yaml"), None)
        .await
        .unwrap();
    assert_eq!(content.package_infos[0].package_name(), "a/b");
}

#[tokio::test]
async fn test_http_registry_archive() {
    // a tar.gz archive holding registry.yaml at its root
    let mut archive = Vec::new();
    {
        let encoder = flate2::write::GzEncoder::new(&mut archive, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(REGISTRY_YAML.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "registry.yaml", REGISTRY_YAML.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registry/v1.0.0/registry.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let registry = http_registry(
        "http-archive",
        &format!("{}/registry/{{{{.Version}}}}/registry.tar.gz", server.uri()),
        "v1.0.0",
        Some("tar.gz"),
    );

    let content = installer
        .install_registry(&registry, Path::new("aqua.yaml"), None)
        .await
        .unwrap();
    assert_eq!(content.package_infos.len(), 1);

    // the extracted registry was materialized at the cache path
    let cached = registry
        .file_path(root.path(), Path::new("aqua.yaml"))
        .unwrap();
    assert_eq!(std::fs::read_to_string(cached).unwrap(), REGISTRY_YAML);
}

#[tokio::test]
async fn test_http_registry_download_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registry/v1.0.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let registry = http_registry(
        "bad",
        &format!("{}/registry/{{{{.Version}}}}/registry.yaml", server.uri()),
        "v1.0.0",
        None,
    );
    let err = installer
        .install_registry(&registry, Path::new("aqua.yaml"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DownloadFailed { .. }));
}

#[tokio::test]
async fn test_http_registry_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registry/v1.0.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"packages: {{{{".to_vec()))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let registry = http_registry(
        "bad",
        &format!("{}/registry/{{{{.Version}}}}/registry.yaml", server.uri()),
        "v1.0.0",
        None,
    );
    let err = installer
        .install_registry(&registry, Path::new("aqua.yaml"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RegistryParse { .. }));
}

#[tokio::test]
async fn test_validate_runs_before_acquisition() {
    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let registry = Registry {
        name: "unstable".to_string(),
        source: RegistrySource::GithubContent {
            repo_owner: "x".to_string(),
            repo_name: "y".to_string(),
            reference: "main".to_string(),
            path: "registry.yaml".to_string(),
        },
    };
    let err = installer
        .install_registry(&registry, Path::new("aqua.yaml"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RegistryInvalid { .. }));
}

#[tokio::test]
async fn test_local_registry_read_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("registry.yaml")).unwrap();
    file.write_all(REGISTRY_YAML.as_bytes()).unwrap();

    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let registry = Registry {
        name: "local".to_string(),
        source: RegistrySource::Local {
            path: "registry.yaml".into(),
        },
    };
    let content = installer
        .install_registry(&registry, &dir.path().join("aqua.yaml"), None)
        .await
        .unwrap();
    assert_eq!(content.package_infos.len(), 1);
}

#[tokio::test]
async fn test_registry_group_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registry/v1.0.0/registry.yaml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let installer = new_installer(root.path());
    let cfg = Config {
        registries: vec![http_registry(
            "broken",
            &format!("{}/registry/{{{{.Version}}}}/registry.yaml", server.uri()),
            "v1.0.0",
            None,
        )],
        ..Default::default()
    };
    assert!(installer
        .install_registries(&cfg, Path::new("aqua.yaml"), None)
        .await
        .is_err());
}
