//! Git collaborator.
//!
//! Release metadata discovery and `git archive` snapshots go through the git
//! executable. The snapshot operation sits behind [`Snapshotter`] so the source
//! archive stage can be driven by any implementation.

use crate::archive::ArchiveFormat;
use crate::context::GitInfo;
use crate::error::{GitError, ReleaseError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Parameters of a repository snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Repository checkout
    pub repo_dir: PathBuf,
    /// Commit to snapshot
    pub commit: String,
    /// Prefix applied to every entry; may be empty
    pub prefix: String,
    /// Output archive
    pub output: PathBuf,
    /// Output format
    pub format: ArchiveFormat,
}

/// Produces a clean archive of a single commit
pub trait Snapshotter: Send + Sync {
    /// Write the archive described by `request`
    fn snapshot(&self, request: &SnapshotRequest) -> Result<()>;
}

/// [`Snapshotter`] backed by `git archive`
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
}

impl GitCli {
    /// Locate the git executable
    pub fn new() -> Result<Self> {
        let git = which::which("git").map_err(|_| ReleaseError::Git(GitError::NotInstalled))?;
        Ok(Self { git })
    }

    /// Run a git sub-command and return trimmed stdout
    fn run(&self, repo_dir: &Path, args: &[&str]) -> Result<String> {
        log::debug!("running git {}", args.join(" "));
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(repo_dir)
            .output()
            .map_err(|e| {
                ReleaseError::Git(GitError::CommandFailed {
                    command: args.join(" "),
                    reason: e.to_string(),
                })
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not a git repository") {
                return Err(ReleaseError::Git(GitError::NotRepository));
            }
            return Err(ReleaseError::Git(GitError::CommandFailed {
                command: args.join(" "),
                reason: stderr,
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Discover commit, branch and tag of the checkout
    pub fn discover(&self, repo_dir: &Path) -> Result<GitInfo> {
        let full_commit = self.run(repo_dir, &["rev-parse", "HEAD"])?;
        let short_commit = self.run(repo_dir, &["rev-parse", "--short", "HEAD"])?;
        let branch = self
            .run(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .unwrap_or_default();
        // A repository without tags is valid for snapshot releases.
        let current_tag = self
            .run(repo_dir, &["describe", "--tags", "--abbrev=0"])
            .unwrap_or_default();

        Ok(GitInfo {
            full_commit,
            short_commit,
            branch,
            current_tag,
        })
    }
}

impl Snapshotter for GitCli {
    fn snapshot(&self, request: &SnapshotRequest) -> Result<()> {
        let output = request.output.to_string_lossy().to_string();
        let format = format!("--format={}", request.format.as_str());
        let mut args = vec!["archive", format.as_str(), "-o", output.as_str()];
        let prefix = format!("--prefix={}", request.prefix);
        if !request.prefix.is_empty() {
            args.push(prefix.as_str());
        }
        args.push(request.commit.as_str());
        self.run(&request.repo_dir, &args)?;
        Ok(())
    }
}
