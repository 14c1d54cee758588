//! Artifact registry shared by every pipeline stage.
//!
//! Artifacts are immutable facts about the run: stages append them and later
//! stages query them by type, group identifier, or metadata. Every query returns an
//! independent snapshot, so iterating a result never observes later insertions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Closed set of artifact kinds produced during a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    /// Raw build output, not uploaded directly
    Binary,
    /// Binary meant to be uploaded as-is
    UploadableBinary,
    /// Packaged archive of binaries
    UploadableArchive,
    /// Snapshot archive of the repository sources
    UploadableSourceArchive,
    /// Plain file gathered from the filesystem for upload
    UploadableFile,
    /// deb, rpm, apk and friends
    LinuxPackage,
    /// Container image reference
    DockerImage,
    /// Checksum file
    Checksum,
    /// Detached signature
    Signature,
    /// Signing certificate
    Certificate,
    /// Release metadata (e.g. JSON manifests)
    Metadata,
}

impl ArtifactType {
    /// Every artifact type, in declaration order
    pub const ALL: [ArtifactType; 11] = [
        ArtifactType::Binary,
        ArtifactType::UploadableBinary,
        ArtifactType::UploadableArchive,
        ArtifactType::UploadableSourceArchive,
        ArtifactType::UploadableFile,
        ArtifactType::LinuxPackage,
        ArtifactType::DockerImage,
        ArtifactType::Checksum,
        ArtifactType::Signature,
        ArtifactType::Certificate,
        ArtifactType::Metadata,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Binary => "binary",
            ArtifactType::UploadableBinary => "uploadable-binary",
            ArtifactType::UploadableArchive => "uploadable-archive",
            ArtifactType::UploadableSourceArchive => "uploadable-source-archive",
            ArtifactType::UploadableFile => "uploadable-file",
            ArtifactType::LinuxPackage => "linux-package",
            ArtifactType::DockerImage => "docker-image",
            ArtifactType::Checksum => "checksum",
            ArtifactType::Signature => "signature",
            ArtifactType::Certificate => "certificate",
            ArtifactType::Metadata => "metadata",
        }
    }

    /// Whether this type describes a file attached to a primary artifact
    pub fn is_sidecar(&self) -> bool {
        matches!(
            self,
            ArtifactType::Checksum
                | ArtifactType::Signature
                | ArtifactType::Certificate
                | ArtifactType::Metadata
        )
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed artifact metadata.
///
/// Well-known keys are explicit fields; anything else lives in `custom`.
/// [`Extra::get`] gives uniform lookup-by-key over both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extra {
    /// Owning group identifier
    pub id: Option<String>,
    /// Archive or package format (e.g. `tar.gz`)
    pub format: Option<String>,
    /// File extension including the leading dot (e.g. `.deb`)
    pub ext: Option<String>,
    /// Binary name the artifact was built from
    pub binary: Option<String>,
    /// Free-form key/value pairs
    pub custom: BTreeMap<String, String>,
}

/// Key of [`Extra::id`]
pub const EXTRA_ID: &str = "ID";
/// Key of [`Extra::format`]
pub const EXTRA_FORMAT: &str = "Format";
/// Key of [`Extra::ext`]
pub const EXTRA_EXT: &str = "Ext";
/// Key of [`Extra::binary`]
pub const EXTRA_BINARY: &str = "Binary";

impl Extra {
    /// Look up a value by key, well-known keys first
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            EXTRA_ID => self.id.as_deref(),
            EXTRA_FORMAT => self.format.as_deref(),
            EXTRA_EXT => self.ext.as_deref(),
            EXTRA_BINARY => self.binary.as_deref(),
            other => self.custom.get(other).map(String::as_str),
        }
    }

    /// Set a value by key, routing well-known keys to their fields
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            EXTRA_ID => self.id = Some(value),
            EXTRA_FORMAT => self.format = Some(value),
            EXTRA_EXT => self.ext = Some(value),
            EXTRA_BINARY => self.binary = Some(value),
            _ => {
                self.custom.insert(key, value);
            }
        }
    }
}

/// A produced file or logical unit of the release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Display name, also the upload file name
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
    /// Target operating system
    pub goos: Option<String>,
    /// Target architecture
    pub goarch: Option<String>,
    /// Artifact kind
    #[serde(rename = "type")]
    pub kind: ArtifactType,
    /// Typed metadata
    pub extra: Extra,
}

impl Artifact {
    /// Create an artifact with empty metadata
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: ArtifactType) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            goos: None,
            goarch: None,
            kind,
            extra: Extra::default(),
        }
    }

    /// Set the target platform
    pub fn with_platform(mut self, goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        self.goos = Some(goos.into());
        self.goarch = Some(goarch.into());
        self
    }

    /// Set the group identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.extra.id = Some(id.into());
        self
    }

    /// Set the format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.extra.format = Some(format.into());
        self
    }

    /// Set the extension
    pub fn with_ext(mut self, ext: impl Into<String>) -> Self {
        self.extra.ext = Some(ext.into());
        self
    }

    /// Group identifier, if any
    pub fn id(&self) -> Option<&str> {
        self.extra.id.as_deref()
    }

    /// Extension as recorded, falling back to the path's extension
    pub fn ext(&self) -> Option<String> {
        self.extra.ext.clone().or_else(|| {
            Path::new(&self.name)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
        })
    }
}

/// Composable artifact predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactFilter {
    /// Artifact type is one of the listed types
    ByType(Vec<ArtifactType>),
    /// Group identifier is one of the listed ids
    ByIds(Vec<String>),
    /// Recorded extension or format is one of the listed values (leading dot optional)
    ByExt(Vec<String>),
    /// Target OS equals the value
    ByGoos(String),
    /// Extra metadata key equals the value
    ByExtra(String, String),
    /// All inner filters match
    And(Vec<ArtifactFilter>),
    /// Any inner filter matches
    Or(Vec<ArtifactFilter>),
    /// Inner filter does not match
    Not(Box<ArtifactFilter>),
}

impl ArtifactFilter {
    /// Convenience constructor for a single type
    pub fn by_type(kind: ArtifactType) -> Self {
        ArtifactFilter::ByType(vec![kind])
    }

    /// Convenience constructor for an id allow-list
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ArtifactFilter::ByIds(ids.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for an extension allow-list
    pub fn by_ext<I, S>(exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ArtifactFilter::ByExt(exts.into_iter().map(Into::into).collect())
    }

    /// Evaluate the predicate
    pub fn matches(&self, artifact: &Artifact) -> bool {
        match self {
            ArtifactFilter::ByType(kinds) => kinds.contains(&artifact.kind),
            ArtifactFilter::ByIds(ids) => artifact
                .id()
                .is_some_and(|id| ids.iter().any(|candidate| candidate == id)),
            ArtifactFilter::ByExt(exts) => exts.iter().any(|want| {
                let want = want.trim_start_matches('.');
                let ext_match = artifact
                    .ext()
                    .is_some_and(|ext| ext.trim_start_matches('.') == want);
                let format_match = artifact.extra.format.as_deref() == Some(want);
                ext_match || format_match
            }),
            ArtifactFilter::ByGoos(goos) => artifact.goos.as_deref() == Some(goos.as_str()),
            ArtifactFilter::ByExtra(key, value) => artifact.extra.get(key) == Some(value.as_str()),
            ArtifactFilter::And(filters) => filters.iter().all(|f| f.matches(artifact)),
            ArtifactFilter::Or(filters) => filters.iter().any(|f| f.matches(artifact)),
            ArtifactFilter::Not(filter) => !filter.matches(artifact),
        }
    }
}

/// Append-only, thread-safe artifact collection preserving insertion order
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    items: Arc<RwLock<Vec<Artifact>>>,
}

impl Artifacts {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact
    pub fn add(&self, artifact: Artifact) {
        log::debug!(
            "added new artifact name={} type={} path={}",
            artifact.name,
            artifact.kind,
            artifact.path.display()
        );
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.push(artifact);
    }

    /// Snapshot of every artifact in insertion order
    pub fn list(&self) -> Vec<Artifact> {
        self.read().clone()
    }

    /// Snapshot of the artifacts matching `filter`, in insertion order
    pub fn filter(&self, filter: &ArtifactFilter) -> Vec<Artifact> {
        self.read()
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect()
    }

    /// Number of artifacts
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Artifact>> {
        self.items.read().unwrap_or_else(|e| e.into_inner())
    }
}
