//! Archive writers for zip, tar and gzipped tar.
//!
//! An [`Archive`] either starts empty or is seeded by copying every entry of an
//! existing archive of the same format. That copy is how files get appended:
//! none of the three formats supports a uniform in-place append, so callers back
//! the original up, truncate it, copy the backup in and add new entries on top.

mod files;

pub use files::{ArchiveFile, evaluate};
pub(crate) use files::expand;

use crate::error::{ArchiveError, ErrorExt, ReleaseError, Result};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::str::FromStr;
use tar::HeaderMode;
use zip::write::SimpleFileOptions;

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// `.tar`
    Tar,
    /// `.tgz`
    Tgz,
    /// `.tar.gz`
    TarGz,
}

impl ArchiveFormat {
    /// Every supported format
    pub const ALL: [ArchiveFormat; 4] = [
        ArchiveFormat::Zip,
        ArchiveFormat::Tar,
        ArchiveFormat::Tgz,
        ArchiveFormat::TarGz,
    ];

    /// Format name, also the file extension without the leading dot
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Tgz => "tgz",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        ArchiveFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ArchiveError::InvalidFormat(s.to_string()).into())
    }
}

enum Writer<W: Write + Seek> {
    Tar(tar::Builder<W>),
    TarGz(tar::Builder<GzEncoder<W>>),
    Zip(zip::ZipWriter<W>),
}

/// An archive being written
pub struct Archive<W: Write + Seek> {
    writer: Writer<W>,
    entries: HashSet<String>,
}

impl<W: Write + Seek> fmt::Debug for Archive<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<W: Write + Seek> Archive<W> {
    /// Start an empty archive
    pub fn new(writer: W, format: ArchiveFormat) -> Self {
        let writer = match format {
            ArchiveFormat::Zip => Writer::Zip(zip::ZipWriter::new(writer)),
            ArchiveFormat::Tar => Writer::Tar(tar::Builder::new(writer)),
            ArchiveFormat::Tgz | ArchiveFormat::TarGz => Writer::TarGz(tar::Builder::new(
                GzEncoder::new(writer, Compression::default()),
            )),
        };
        Self {
            writer,
            entries: HashSet::new(),
        }
    }

    /// Start an archive holding every entry of `source`, which must be in `format`
    pub fn copy_from<R: Read + Seek>(source: R, writer: W, format: ArchiveFormat) -> Result<Self> {
        let mut archive = Self::new(writer, format);
        match &mut archive.writer {
            Writer::Tar(builder) => copy_tar(source, builder, &mut archive.entries)?,
            Writer::TarGz(builder) => {
                copy_tar(GzDecoder::new(source), builder, &mut archive.entries)?
            }
            Writer::Zip(zip) => copy_zip(source, zip, &mut archive.entries)?,
        }
        log::debug!("copied {} entries into new archive", archive.entries.len());
        Ok(archive)
    }

    /// Names of the entries written so far
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Add a file from disk under its destination name
    pub fn add(&mut self, file: &ArchiveFile) -> Result<()> {
        if !self.entries.insert(file.destination.clone()) {
            return Err(ArchiveError::DuplicateEntry {
                destination: file.destination.clone(),
            }
            .into());
        }
        log::debug!(
            "adding file to archive src={} dst={}",
            file.source.display(),
            file.destination
        );
        match &mut self.writer {
            Writer::Tar(builder) => add_tar(builder, file),
            Writer::TarGz(builder) => add_tar(builder, file),
            Writer::Zip(zip) => add_zip(zip, file),
        }
    }

    /// Finalize the archive and hand back the underlying writer
    pub fn finish(self) -> Result<W> {
        let inner = match self.writer {
            Writer::Tar(builder) => builder.into_inner()?,
            Writer::TarGz(builder) => builder.into_inner()?.finish()?,
            Writer::Zip(zip) => zip.finish().map_err(ArchiveError::from)?,
        };
        Ok(inner)
    }
}

fn copy_tar<R: Read, T: Write>(
    source: R,
    builder: &mut tar::Builder<T>,
    entries: &mut HashSet<String>,
) -> Result<()> {
    let mut archive = tar::Archive::new(source);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        // git archive stores the commit id in a global pax header; it is not a file.
        if kind.is_pax_global_extensions() {
            continue;
        }
        let path = entry.path()?.into_owned();
        let mut header = entry.header().clone();
        if kind.is_symlink() || kind.is_hard_link() {
            let target = entry
                .link_name()?
                .map(|t| t.into_owned())
                .unwrap_or_default();
            builder.append_link(&mut header, &path, &target)?;
        } else {
            builder.append_data(&mut header, &path, &mut entry)?;
        }
        entries.insert(path.to_string_lossy().trim_end_matches('/').to_string());
    }
    Ok(())
}

fn copy_zip<R: Read + Seek, T: Write + Seek>(
    source: R,
    zip: &mut zip::ZipWriter<T>,
    entries: &mut HashSet<String>,
) -> Result<()> {
    let mut archive = zip::ZipArchive::new(source).map_err(ArchiveError::from)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(ArchiveError::from)?;
        let name = file.name().to_string();
        let mut options = SimpleFileOptions::default().compression_method(file.compression());
        if let Some(mode) = file.unix_mode() {
            options = options.unix_permissions(mode);
        }
        if file.is_dir() {
            zip.add_directory(name.clone(), options)
                .map_err(ArchiveError::from)?;
        } else {
            zip.start_file(name.clone(), options)
                .map_err(ArchiveError::from)?;
            io::copy(&mut file, zip)?;
        }
        entries.insert(name.trim_end_matches('/').to_string());
    }
    Ok(())
}

fn add_tar<T: Write>(builder: &mut tar::Builder<T>, file: &ArchiveFile) -> Result<()> {
    let metadata =
        std::fs::metadata(&file.source).fs_context("reading file info", &file.source)?;
    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);
    if let Some(mode) = file.mode {
        header.set_mode(mode);
    }

    if metadata.is_dir() {
        builder
            .append_data(&mut header, &file.destination, io::empty())
            .fs_context("adding directory to archive", &file.source)?;
    } else {
        let mut source =
            std::fs::File::open(&file.source).fs_context("opening file", &file.source)?;
        builder
            .append_data(&mut header, &file.destination, &mut source)
            .fs_context("adding file to archive", &file.source)?;
    }
    Ok(())
}

fn add_zip<T: Write + Seek>(zip: &mut zip::ZipWriter<T>, file: &ArchiveFile) -> Result<()> {
    let metadata =
        std::fs::metadata(&file.source).fs_context("reading file info", &file.source)?;
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(file.mode.unwrap_or_else(|| default_mode(&metadata)));

    if metadata.is_dir() {
        zip.add_directory(file.destination.clone(), options)
            .map_err(ArchiveError::from)?;
    } else {
        zip.start_file(file.destination.clone(), options)
            .map_err(ArchiveError::from)?;
        let mut source =
            std::fs::File::open(&file.source).fs_context("opening file", &file.source)?;
        io::copy(&mut source, zip).fs_context("adding file to archive", &file.source)?;
    }
    Ok(())
}

#[cfg(unix)]
fn default_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn default_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.is_dir() { 0o755 } else { 0o644 }
}

/// Join an archive prefix and an entry name with exactly one `/` between them
pub fn join_prefix(prefix: &str, name: &str) -> String {
    let name = name.trim_start_matches("./").trim_start_matches('/');
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;

    pub(crate) fn list_entries(bytes: &[u8], format: ArchiveFormat) -> Vec<String> {
        let mut names = Vec::new();
        match format {
            ArchiveFormat::Zip => {
                let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
                for i in 0..zip.len() {
                    names.push(zip.by_index(i).unwrap().name().to_string());
                }
            }
            ArchiveFormat::Tar => {
                let mut tar = tar::Archive::new(Cursor::new(bytes));
                for entry in tar.entries().unwrap() {
                    names.push(entry.unwrap().path().unwrap().to_string_lossy().to_string());
                }
            }
            ArchiveFormat::Tgz | ArchiveFormat::TarGz => {
                let mut tar = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
                for entry in tar.entries().unwrap() {
                    names.push(entry.unwrap().path().unwrap().to_string_lossy().to_string());
                }
            }
        }
        names
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> ArchiveFile {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        ArchiveFile::new(path, name)
    }

    #[test]
    fn parses_known_formats_only() {
        for format in ArchiveFormat::ALL {
            assert_eq!(format.as_str().parse::<ArchiveFormat>().unwrap(), format);
        }
        assert!("rar".parse::<ArchiveFormat>().is_err());
        assert!("".parse::<ArchiveFormat>().is_err());
    }

    #[test]
    fn copy_then_append_keeps_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.txt", "a");
        let b = write_file(dir.path(), "b.txt", "b");

        for format in ArchiveFormat::ALL {
            let mut first = Archive::new(Cursor::new(Vec::new()), format);
            first.add(&a).unwrap();
            let original = first.finish().unwrap().into_inner();

            let mut second =
                Archive::copy_from(Cursor::new(original), Cursor::new(Vec::new()), format)
                    .unwrap();
            second.add(&b).unwrap();
            let rewritten = second.finish().unwrap().into_inner();

            assert_eq!(list_entries(&rewritten, format), ["a.txt", "b.txt"], "{format}");
        }
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.txt", "a");
        let mut archive = Archive::new(Cursor::new(Vec::new()), ArchiveFormat::Tar);
        archive.add(&a).unwrap();
        let err = archive.add(&a).unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Archive(ArchiveError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn prefix_join_has_single_separator() {
        assert_eq!(join_prefix("", "a.txt"), "a.txt");
        assert_eq!(join_prefix("proj-1.0", "a.txt"), "proj-1.0/a.txt");
        assert_eq!(join_prefix("proj-1.0/", "./a.txt"), "proj-1.0/a.txt");
    }
}
