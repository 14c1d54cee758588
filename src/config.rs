//! Release configuration tree.
//!
//! The tree is deserialized from TOML with serde. Deserialization is the only
//! thing this module does: semantic validation belongs to the stage that consumes
//! a section, and defaults are filled in by each stage's defaulting phase.

use crate::error::{ConfigError, ErrorExt, ReleaseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "release.toml";

/// Upload mode admitting packages and archives
pub const MODE_ARCHIVE: &str = "archive";

/// Upload mode admitting uploadable binaries only
pub const MODE_BINARY: &str = "binary";

/// Top-level project configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Project name, exposed to templates as `ProjectName`
    pub project_name: String,
    /// Output directory for produced artifacts
    pub dist: PathBuf,
    /// `KEY=VALUE` entries layered over the process environment
    pub env: Vec<String>,
    /// Maximum concurrent transfers per upload target (0 = number of CPUs)
    pub parallelism: usize,
    /// Source archive settings
    pub source: SourceConfig,
    /// HTTP upload targets
    pub uploads: Vec<Upload>,
}

/// Source archive settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Whether the source archive stage runs at all
    pub enabled: bool,
    /// One of `zip`, `tar`, `tgz`, `tar.gz`
    pub format: String,
    /// Archive base name template
    pub name_template: String,
    /// Path prefix applied to every archive entry
    pub prefix_template: String,
    /// Files outside version control to add to the archive
    pub files: Vec<ArchiveExtraFile>,
}

/// A glob of extra files to place inside an archive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveExtraFile {
    /// Source glob, template-resolved
    pub src: String,
    /// Destination directory inside the archive, template-resolved
    pub dst: String,
    /// Place matches directly under `dst` instead of keeping their path
    pub strip_parent: bool,
    /// Entry metadata overrides
    pub info: FileInfo,
}

/// Archive entry metadata overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileInfo {
    /// Unix permission bits
    pub mode: Option<u32>,
}

/// A published HTTP destination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upload {
    /// Target name, also used to derive environment variable names
    pub name: String,
    /// Destination URL template
    pub target: String,
    /// HTTP method, defaults to PUT
    pub method: String,
    /// Explicit username
    pub username: String,
    /// `archive` or `binary`
    pub mode: String,
    /// Include checksum sidecars
    pub checksum: bool,
    /// Include signature and certificate sidecars
    pub signature: bool,
    /// Include metadata sidecars
    pub meta: bool,
    /// Allowed extensions or formats; empty admits all
    pub exts: Vec<String>,
    /// Allowed artifact group identifiers; empty admits all
    pub ids: Vec<String>,
    /// Header templates sent with every request
    pub custom_headers: BTreeMap<String, String>,
    /// PEM bundle restricting TLS trust
    pub trusted_certificates: String,
    /// Client certificate (PEM) path for mutual TLS
    pub client_x509_cert: String,
    /// Client private key (PEM) path for mutual TLS
    pub client_x509_key: String,
    /// Header receiving the SHA-256 of the request body
    pub checksum_header: String,
    /// Upload only `extra_files`, ignoring the artifact registry
    pub extra_files_only: bool,
    /// Additional files to upload
    pub extra_files: Vec<UploadExtraFile>,
    /// Skip predicate: `true`, `false`, or a template evaluating to either
    pub skip: String,
}

/// A glob of files uploaded next to registry artifacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadExtraFile {
    /// Source glob, template-resolved
    pub glob: String,
    /// Upload name template; defaults to the file's base name
    pub name_template: String,
}

impl Project {
    /// Load a project config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReleaseError::Config(ConfigError::NotFound {
                path: path.to_path_buf(),
            }));
        }
        let content = std::fs::read_to_string(path).fs_context("reading config file", path)?;
        Self::parse(&content)
    }

    /// Parse a project config from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Effective per-target upload parallelism
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism == 0 {
            num_cpus::get().max(1)
        } else {
            self.parallelism
        }
    }
}
