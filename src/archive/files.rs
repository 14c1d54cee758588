//! Resolution of extra-file globs into archive entries.

use crate::config::ArchiveExtraFile;
use crate::error::{ArchiveError, Result};
use crate::tmpl::Template;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A file on disk and the name it gets inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    /// File on disk
    pub source: PathBuf,
    /// Entry name inside the archive, `/` separated
    pub destination: String,
    /// Permission bits override
    pub mode: Option<u32>,
}

impl ArchiveFile {
    /// Entry for `source` named `destination`, keeping its own permissions
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode: None,
        }
    }
}

/// Resolve extra-file globs into a deduplicated list sorted by destination.
///
/// Directories matched by a glob are expanded to the files beneath them. A glob
/// matching nothing is an error. When two globs produce the same destination,
/// the first one wins.
pub fn evaluate(tmpl: &Template<'_>, files: &[ArchiveExtraFile]) -> Result<Vec<ArchiveFile>> {
    let mut resolved: BTreeMap<String, ArchiveFile> = BTreeMap::new();

    for file in files {
        let pattern = tmpl.apply(&file.src)?;
        let dst = tmpl.apply(&file.dst)?;

        let matches = expand(&pattern)?;
        if matches.is_empty() {
            return Err(ArchiveError::NoMatch { pattern }.into());
        }

        for path in matches {
            let destination = destination_for(&path, &dst, file.strip_parent);
            if resolved.contains_key(&destination) {
                log::debug!("ignoring duplicate extra file {destination}");
                continue;
            }
            resolved.insert(
                destination.clone(),
                ArchiveFile {
                    source: path,
                    destination,
                    mode: file.info.mode,
                },
            );
        }
    }

    Ok(resolved.into_values().collect())
}

/// Files matched by a glob, with directories walked recursively
pub(crate) fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| ArchiveError::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for path in paths {
        let path = path.map_err(|e| ArchiveError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        if path.is_dir() {
            files.extend(
                walkdir::WalkDir::new(&path)
                    .follow_links(false)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| !e.file_type().is_dir())
                    .map(|e| e.into_path()),
            );
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

fn destination_for(path: &Path, dst: &str, strip_parent: bool) -> String {
    let name = if strip_parent {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        slash_path(path)
    };
    let dst = dst.trim_matches('/');
    if dst.is_empty() {
        name
    } else {
        super::join_prefix(dst, &name)
    }
}

fn slash_path(path: &Path) -> String {
    let joined = path
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>();
    joined.join("/")
}
