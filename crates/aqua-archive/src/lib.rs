//! # aqua-archive
//!
//! Identifies archive formats and extracts them into a destination
//! directory, preserving file modes. `raw` means "not an archive": the file
//! is copied in and marked executable.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use aqua_core::error::{Error, Result};
use aqua_core::util;
use tracing::debug;

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Zip,
    Raw,
    Dmg,
}

impl Format {
    /// Parse a registry `format` field
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tar" => Some(Self::Tar),
            "tar.gz" | "tgz" => Some(Self::TarGz),
            "tar.bz2" | "tbz2" => Some(Self::TarBz2),
            "tar.xz" | "txz" => Some(Self::TarXz),
            "zip" => Some(Self::Zip),
            "raw" | "" => Some(Self::Raw),
            "dmg" => Some(Self::Dmg),
            _ => None,
        }
    }

    /// Identify a format from a file name; unknown extensions are `Raw`
    pub fn detect(file_name: &str) -> Self {
        if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
            Self::TarGz
        } else if file_name.ends_with(".tar.bz2") || file_name.ends_with(".tbz2") {
            Self::TarBz2
        } else if file_name.ends_with(".tar.xz") || file_name.ends_with(".txz") {
            Self::TarXz
        } else if file_name.ends_with(".tar") {
            Self::Tar
        } else if file_name.ends_with(".zip") {
            Self::Zip
        } else if file_name.ends_with(".dmg") {
            Self::Dmg
        } else {
            Self::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::TarXz => "tar.xz",
            Self::Zip => "zip",
            Self::Raw => "raw",
            Self::Dmg => "dmg",
        }
    }

    /// Whether the artifact is installed as-is rather than extracted
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw)
    }
}

/// A downloaded artifact to extract
#[derive(Debug)]
pub struct ArchiveFile<'a> {
    /// Location of the downloaded artifact
    pub path: &'a Path,
    /// Its original file name, used to place raw files
    pub name: &'a str,
    pub format: Format,
}

/// Extract an artifact into `dest`, creating the directory with 0755.
pub fn unarchive(file: &ArchiveFile<'_>, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    debug!(
        src = %file.path.display(),
        dest = %dest.display(),
        format = file.format.as_str(),
        "extracting an archive"
    );
    match file.format {
        Format::Tar => unpack_tar(File::open(file.path)?, dest, file.path),
        Format::TarGz => unpack_tar(
            flate2::read::GzDecoder::new(File::open(file.path)?),
            dest,
            file.path,
        ),
        Format::TarBz2 => unpack_tar(
            bzip2::read::BzDecoder::new(File::open(file.path)?),
            dest,
            file.path,
        ),
        Format::TarXz => unpack_tar(
            xz2::read::XzDecoder::new(File::open(file.path)?),
            dest,
            file.path,
        ),
        Format::Zip => unpack_zip(file.path, dest),
        Format::Raw => {
            let target = dest.join(file.name);
            std::fs::copy(file.path, &target)?;
            util::make_executable(&target)?;
            Ok(())
        }
        Format::Dmg => unpack_dmg(file.path, dest),
    }
}

fn unpack_tar<R: Read>(reader: R, dest: &Path, src: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|e| Error::extract(src, e))
}

fn unpack_zip(src: &Path, dest: &Path) -> Result<()> {
    let file = File::open(src)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::extract(src, e))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| Error::extract(src, e))?;
        let Some(rel_path) = entry.enclosed_name() else {
            // entries escaping the destination are skipped, not an error
            debug!(entry = entry.name(), "skipping a zip entry with an unsafe path");
            continue;
        };
        let out_path = dest.join(rel_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

/// dmg images require the macOS hdiutil toolchain
fn unpack_dmg(src: &Path, dest: &Path) -> Result<()> {
    if std::env::consts::OS != "macos" {
        return Err(Error::extract(
            src,
            "dmg archives are supported only on macOS",
        ));
    }
    let mount_point = mount_dmg(src)?;
    let result = copy_dir_contents(&mount_point, dest);
    let detach = std::process::Command::new("hdiutil")
        .arg("detach")
        .arg(&mount_point)
        .output();
    if let Err(e) = detach {
        debug!(error = %e, "failed to detach a dmg image");
    }
    result
}

fn mount_dmg(src: &Path) -> Result<PathBuf> {
    let mount_point = std::env::temp_dir().join(format!(
        "aqua-dmg-{}",
        src.file_stem().unwrap_or_default().to_string_lossy()
    ));
    let output = std::process::Command::new("hdiutil")
        .arg("attach")
        .arg("-nobrowse")
        .arg("-mountpoint")
        .arg(&mount_point)
        .arg(src)
        .output()?;
    if !output.status.success() {
        return Err(Error::extract(
            src,
            format!(
                "hdiutil attach failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(mount_point)
}

fn copy_dir_contents(from: &Path, to: &Path) -> Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_dir_contents(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("tar.gz"), Some(Format::TarGz));
        assert_eq!(Format::parse("tgz"), Some(Format::TarGz));
        assert_eq!(Format::parse("zip"), Some(Format::Zip));
        assert_eq!(Format::parse("raw"), Some(Format::Raw));
        assert_eq!(Format::parse(""), Some(Format::Raw));
        assert_eq!(Format::parse("7z"), None);
    }

    #[test]
    fn test_format_detect() {
        assert_eq!(Format::detect("gh_2.4.0_linux_amd64.tar.gz"), Format::TarGz);
        assert_eq!(Format::detect("tool.tbz2"), Format::TarBz2);
        assert_eq!(Format::detect("tool.tar.xz"), Format::TarXz);
        assert_eq!(Format::detect("tool.tar"), Format::Tar);
        assert_eq!(Format::detect("tool.zip"), Format::Zip);
        assert_eq!(Format::detect("gh"), Format::Raw);
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_unarchive_tar_gz_preserves_exec_bit() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("tool.tar.gz");
        write_tar_gz(
            &archive_path,
            &[
                ("bin/tool", b"#!/bin/sh\n", 0o755),
                ("README.md", b"readme", 0o644),
            ],
        );

        let dest = dir.path().join("out");
        unarchive(
            &ArchiveFile {
                path: &archive_path,
                name: "tool.tar.gz",
                format: Format::TarGz,
            },
            &dest,
        )
        .unwrap();

        assert!(dest.join("README.md").is_file());
        let tool = dest.join("bin").join("tool");
        assert!(tool.is_file());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&tool).unwrap().permissions().mode();
            assert_eq!(mode & 0o100, 0o100);
        }
    }

    #[test]
    fn test_unarchive_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("tool.zip");
        {
            let file = File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
            writer.start_file("tool", options).unwrap();
            writer.write_all(b"#!/bin/sh\n").unwrap();
            writer.finish().unwrap();
        }

        let dest = dir.path().join("out");
        unarchive(
            &ArchiveFile {
                path: &archive_path,
                name: "tool.zip",
                format: Format::Zip,
            },
            &dest,
        )
        .unwrap();

        let tool = dest.join("tool");
        assert!(tool.is_file());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&tool).unwrap().permissions().mode();
            assert_eq!(mode & 0o100, 0o100);
        }
    }

    #[test]
    fn test_unarchive_raw_is_copied_executable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("downloaded");
        std::fs::write(&src, b"#!/bin/sh\n").unwrap();

        let dest = dir.path().join("out");
        unarchive(
            &ArchiveFile {
                path: &src,
                name: "gh",
                format: Format::Raw,
            },
            &dest,
        )
        .unwrap();

        let installed = dest.join("gh");
        assert!(installed.is_file());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&installed).unwrap().permissions().mode();
            assert_eq!(mode & 0o755, 0o755);
        }
    }

    #[test]
    fn test_unarchive_plain_tar() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("tool.tar");
        {
            let file = File::create(&archive_path).unwrap();
            let mut builder = tar::Builder::new(file);
            let mut header = tar::Header::new_gnu();
            header.set_size(5);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "data.txt", &b"hello"[..]).unwrap();
            builder.finish().unwrap();
        }

        let dest = dir.path().join("out");
        unarchive(
            &ArchiveFile {
                path: &archive_path,
                name: "tool.tar",
                format: Format::Tar,
            },
            &dest,
        )
        .unwrap();
        assert_eq!(std::fs::read(dest.join("data.txt")).unwrap(), b"hello");
    }
}
