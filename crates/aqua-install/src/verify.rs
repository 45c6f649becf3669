//! Signature verification capability
//!
//! Cosign and SLSA provenance checks are a pluggable capability: the
//! pipeline only knows the [`SignatureVerifier`] trait. The default
//! implementation shells out to the `cosign` / `slsa-verifier` binaries;
//! tests substitute [`NoopVerifier`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use aqua_core::error::{Error, Result};

/// Which verification tool a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    Cosign,
    SlsaProvenance,
}

/// A single verification of a downloaded artifact
#[derive(Debug)]
pub struct VerifyRequest {
    pub kind: SignatureKind,
    pub artifact: PathBuf,
    pub args: Vec<String>,
}

impl VerifyRequest {
    pub fn cosign(artifact: &Path, args: Vec<String>) -> Self {
        Self {
            kind: SignatureKind::Cosign,
            artifact: artifact.to_path_buf(),
            args,
        }
    }

    pub fn slsa(artifact: &Path, args: Vec<String>) -> Self {
        Self {
            kind: SignatureKind::SlsaProvenance,
            artifact: artifact.to_path_buf(),
            args,
        }
    }

    fn artifact_name(&self) -> String {
        self.artifact
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> Result<()>;
}

/// Verifies by invoking the external tools from PATH
pub struct CommandVerifier;

#[async_trait]
impl SignatureVerifier for CommandVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<()> {
        let mut command = match request.kind {
            SignatureKind::Cosign => {
                let mut c = tokio::process::Command::new("cosign");
                c.arg("verify-blob");
                c.args(&request.args);
                c.arg(&request.artifact);
                c
            }
            SignatureKind::SlsaProvenance => {
                let mut c = tokio::process::Command::new("slsa-verifier");
                c.arg("verify-artifact");
                c.arg(&request.artifact);
                c.args(&request.args);
                c
            }
        };
        debug!(?command, "verifying a signature");
        let output = command.output().await.map_err(|e| Error::SignatureInvalid {
            asset: request.artifact_name(),
            message: e.to_string(),
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::SignatureInvalid {
                asset: request.artifact_name(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Accepts everything; used by tests and when verification is disabled
pub struct NoopVerifier;

#[async_trait]
impl SignatureVerifier for NoopVerifier {
    async fn verify(&self, _request: &VerifyRequest) -> Result<()> {
        Ok(())
    }
}
