//! Error types shared by the aqua crates

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using aqua-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the resolve-install-exec pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// No workspace or global configuration file was found
    #[error("configuration file isn't found (working directory: {wd:?})")]
    ConfigNotFound { wd: PathBuf },

    /// A configuration file exists but couldn't be parsed
    #[error("parse the configuration file {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The `import:` graph of a configuration file contains a cycle
    #[error("the configuration import graph has a cycle at {path:?}")]
    ImportCycle { path: PathBuf },

    /// A registry declaration failed validation
    #[error("the registry {name} is invalid: {reason}")]
    RegistryInvalid {
        name: String,
        reason: RegistryInvalidReason,
    },

    /// A registry file couldn't be acquired
    #[error("download the registry {name} from {url}: {message}")]
    RegistryDownload {
        name: String,
        url: String,
        message: String,
    },

    /// A registry file was acquired but couldn't be parsed
    #[error("parse the registry file {path:?}: {message}")]
    RegistryParse { path: PathBuf, message: String },

    /// A checksum was expected to be recorded but isn't
    #[error("no checksum is recorded for {key}")]
    ChecksumMissing { key: String },

    /// Checksum enforcement is on and no checksum is recorded
    #[error("a checksum is required but isn't recorded for {key}")]
    ChecksumRequired { key: String },

    /// The computed digest doesn't match the recorded one
    #[error("checksum mismatch for {key}: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// A cosign or SLSA provenance verification failed
    #[error("verify the signature of {asset}: {message}")]
    SignatureInvalid { asset: String, message: String },

    /// An artifact download failed
    #[error("download {url}: {message}")]
    DownloadFailed { url: String, message: String },

    /// An archive couldn't be extracted
    #[error("extract the archive {path:?}: {message}")]
    ExtractFailed { path: PathBuf, message: String },

    /// A templated field couldn't be rendered
    #[error("render the template {template}: {message}")]
    TemplateError { template: String, message: String },

    /// The package doesn't support the current OS/architecture
    #[error("the package {package} doesn't support the environment {env}")]
    UnsupportedEnv { package: String, env: String },

    /// A link target is occupied by something that must not be clobbered
    #[error("{path:?} already exists and is a {kind}")]
    PathConflict { path: PathBuf, kind: &'static str },

    /// The policy file forbids this package
    #[error("the policy forbids the package {package}@{version} (registry: {registry})")]
    PolicyDenied {
        registry: String,
        package: String,
        version: String,
    },

    /// A child process couldn't be executed
    #[error("execute {exe}: {message}")]
    ExecFailed { exe: String, message: String },

    /// The invocation was canceled before the operation completed
    #[error("the operation was canceled")]
    Cancelled,

    /// An authenticated GitHub API call was needed but no token is configured
    #[error("GitHub access token is required (set AQUA_GITHUB_TOKEN or GITHUB_TOKEN)")]
    GitHubTokenRequired,

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reasons a registry declaration can fail validation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryInvalidReason {
    #[error("name is required")]
    NameRequired,
    #[error("path is required for local registry")]
    PathRequired,
    #[error("repo_owner is required")]
    RepoOwnerRequired,
    #[error("repo_name is required")]
    RepoNameRequired,
    #[error("ref is required for github_content registry")]
    RefRequired,
    #[error("ref cannot be 'main' or 'master' for github_content registry")]
    RefCannotBeMainOrMaster,
    #[error("url is required for http registry")]
    UrlRequired,
    #[error("version is required for http registry")]
    VersionRequired,
    #[error("url must contain '{{{{.Version}}}}' template for http registry")]
    UrlMustContainVersion,
    #[error("registry type is invalid")]
    InvalidType,
}

impl Error {
    /// Create a download error from a message-bearing source
    pub fn download(url: impl Into<String>, message: impl ToString) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an extraction error
    pub fn extract(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ExtractFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a template rendering error
    pub fn template(template: impl Into<String>, message: impl ToString) -> Self {
        Self::TemplateError {
            template: template.into(),
            message: message.to_string(),
        }
    }
}
