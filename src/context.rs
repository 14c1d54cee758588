//! Release context threaded through every pipeline stage.
//!
//! One context exists per invocation. It owns the parsed configuration, an
//! environment snapshot, version control metadata and the artifact registry.

use crate::artifact::Artifacts;
use crate::config::Project;
use crate::error::{ConfigError, ReleaseError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Snapshot of environment variables.
///
/// Taken once at start; later changes only happen through [`Env::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env(BTreeMap<String, String>);

impl Env {
    /// Snapshot the process environment
    pub fn from_process() -> Self {
        Self(std::env::vars().collect())
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether a variable is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Override a variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a variable
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Layer `KEY=VALUE` entries over the snapshot
    pub fn apply_entries(&mut self, entries: &[String]) -> Result<()> {
        for entry in entries {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                ReleaseError::Config(ConfigError::InvalidValue {
                    section: "env".to_string(),
                    name: String::new(),
                    field: "entry".to_string(),
                    value: entry.clone(),
                    expected: "KEY=VALUE".to_string(),
                })
            })?;
            self.set(key.trim(), value);
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for Env
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Version control metadata for the release commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
    /// Full commit hash
    pub full_commit: String,
    /// Abbreviated commit hash
    pub short_commit: String,
    /// Current branch
    pub branch: String,
    /// Tag pointing at (or preceding) the commit
    pub current_tag: String,
}

/// Process-scoped release state
#[derive(Debug)]
pub struct Context {
    /// Parsed configuration
    pub config: Project,
    /// Environment snapshot
    pub env: Env,
    /// Artifact registry
    pub artifacts: Artifacts,
    /// Resolved version without a leading `v`
    pub version: String,
    /// Resolved tag
    pub tag: String,
    /// Version control metadata
    pub git: GitInfo,
    /// Repository checkout
    pub repo_dir: PathBuf,
    /// Invocation time
    pub date: DateTime<Utc>,
    /// Snapshot (non-tagged) release
    pub snapshot: bool,
    skips: BTreeSet<String>,
}

impl Context {
    /// Create a context over the process environment
    pub fn new(config: Project) -> Result<Self> {
        Self::with_env(config, Env::from_process())
    }

    /// Create a context over an explicit environment snapshot
    pub fn with_env(config: Project, mut env: Env) -> Result<Self> {
        env.apply_entries(&config.env)?;
        Ok(Self {
            config,
            env,
            artifacts: Artifacts::new(),
            version: String::new(),
            tag: String::new(),
            git: GitInfo::default(),
            repo_dir: PathBuf::from("."),
            date: Utc::now(),
            snapshot: false,
            skips: BTreeSet::new(),
        })
    }

    /// Set version and derive the tag from it when no tag is known yet
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        let version = version.strip_prefix('v').unwrap_or(&version).to_string();
        if self.tag.is_empty() {
            self.tag = format!("v{version}");
        }
        self.version = version;
        self
    }

    /// Set the tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Set version control metadata
    pub fn with_git(mut self, git: GitInfo) -> Self {
        self.git = git;
        self
    }

    /// Set the repository checkout directory
    pub fn with_repo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repo_dir = dir.into();
        self
    }

    /// Mark stages the user asked to skip
    pub fn with_skips<I, S>(mut self, skips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skips.extend(skips.into_iter().map(Into::into));
        self
    }

    /// Whether the user asked to skip a stage by its short name
    pub fn skips(&self, stage: &str) -> bool {
        self.skips.contains(stage)
    }

    /// Directory receiving produced artifacts
    pub fn dist(&self) -> PathBuf {
        if self.config.dist.as_os_str().is_empty() {
            PathBuf::from("dist")
        } else {
            self.config.dist.clone()
        }
    }
}
