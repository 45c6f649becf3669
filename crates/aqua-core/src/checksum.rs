//! Checksum storage and digest computation
//!
//! Recorded checksums live in `aqua-checksums.json` next to the workspace
//! configuration. The file is loaded once per invocation, updated in memory
//! as artifacts are verified, and rewritten atomically (write-then-rename)
//! at controller teardown. Cross-process writes are last-writer-wins; lost
//! entries are recoverable by reinstallation.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

/// File name of the checksum store, a sibling of the workspace config
pub const CHECKSUM_FILE_NAME: &str = "aqua-checksums.json";

const DIGEST_CHUNK_SIZE: usize = 1024 * 1024;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Sha256,
    Sha512,
}

/// A recorded digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: Algorithm,
    pub value: String,
}

impl Checksum {
    pub fn new(algorithm: Algorithm, value: impl Into<String>) -> Self {
        Self {
            algorithm,
            value: value.into(),
        }
    }

    /// Hex digests compare case-insensitively
    pub fn matches(&self, value: &str) -> bool {
        self.value.eq_ignore_ascii_case(value)
    }
}

/// The per-workspace checksum set, keyed by artifact identity
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Checksums {
    entries: BTreeMap<String, Checksum>,
    updated: bool,
}

impl Checksums {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite key for a package artifact
    pub fn package_key(
        registry: &str,
        package: &str,
        version: &str,
        os: &str,
        arch: &str,
        asset: &str,
    ) -> String {
        format!("{registry}/{package}/{version}/{os}/{arch}/{asset}")
    }

    /// Composite key for a registry file
    pub fn registry_key(name: &str, version: &str) -> String {
        format!("registries/{name}/{version}")
    }

    /// Path of the checksum file belonging to a workspace config
    pub fn file_path(config_file_path: &Path) -> PathBuf {
        config_file_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CHECKSUM_FILE_NAME)
    }

    pub fn get(&self, key: &str) -> Option<&Checksum> {
        self.entries.get(key)
    }

    pub fn add(&mut self, key: impl Into<String>, checksum: Checksum) {
        self.entries.insert(key.into(), checksum);
        self.updated = true;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify `value` against the recorded digest for `key`.
    ///
    /// A missing entry is only an error when `require` is set; otherwise the
    /// computed digest is recorded so later runs can verify against it.
    pub fn check(&mut self, key: &str, algorithm: Algorithm, value: &str, require: bool) -> Result<()> {
        match self.entries.get(key) {
            Some(recorded) => {
                if recorded.matches(value) {
                    Ok(())
                } else {
                    Err(Error::ChecksumMismatch {
                        key: key.to_string(),
                        expected: recorded.value.clone(),
                        actual: value.to_string(),
                    })
                }
            }
            None if require => Err(Error::ChecksumRequired {
                key: key.to_string(),
            }),
            None => {
                self.add(key, Checksum::new(algorithm, value));
                Ok(())
            }
        }
    }

    /// Load a checksum file; an absent file yields an empty set
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let entries: BTreeMap<String, Checksum> = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self {
            entries,
            updated: false,
        })
    }

    /// Rewrite the checksum file if any entry changed.
    ///
    /// Writes to a temporary file in the same directory and renames it over
    /// the target so concurrent readers never see a partial file.
    pub fn update_file(&self, path: &Path) -> Result<()> {
        if !self.updated {
            return Ok(());
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &self.entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// Incremental digest over streamed download chunks
pub struct Digester {
    inner: DigesterInner,
}

enum DigesterInner {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Digester {
    pub fn new(algorithm: Algorithm) -> Self {
        let inner = match algorithm {
            Algorithm::Sha256 => DigesterInner::Sha256(Sha256::new()),
            Algorithm::Sha512 => DigesterInner::Sha512(Sha512::new()),
        };
        Self { inner }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.inner {
            DigesterInner::Sha256(h) => h.update(chunk),
            DigesterInner::Sha512(h) => h.update(chunk),
        }
    }

    pub fn finalize(self) -> String {
        match self.inner {
            DigesterInner::Sha256(h) => format!("{:x}", h.finalize()),
            DigesterInner::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Hex digest of a byte slice
pub fn digest_bytes(algorithm: Algorithm, bytes: &[u8]) -> String {
    let mut digester = Digester::new(algorithm);
    digester.update(bytes);
    digester.finalize()
}

/// Hex digest of a file, read in chunks
pub fn digest_file(algorithm: Algorithm, path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut digester = Digester::new(algorithm);
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        digester.update(&buffer[..n]);
    }
    Ok(digester.finalize())
}
