//! Command line argument parsing and validation.
//!
//! The tool is designed to "just work": run it in a tagged checkout next to a
//! `release.toml` and it builds the source archive and publishes uploads.

use clap::Parser;
use std::path::PathBuf;

/// Stage-driven release pipeline
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "kodegen_release_pipeline",
    version,
    about = "Build source archives and publish release artifacts over HTTP",
    long_about = "Run the release pipeline for the repository in the current directory.

Usage:
  kodegen_release_pipeline
  kodegen_release_pipeline --config release.toml --skip upload
  kodegen_release_pipeline --snapshot --version-override 1.2.3-dev"
)]
pub struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Stage to skip by name (repeatable): source, upload
    #[arg(long = "skip", value_name = "STAGE")]
    pub skip: Vec<String>,

    /// Output directory, overriding the configured one
    #[arg(long, value_name = "DIR")]
    pub dist: Option<PathBuf>,

    /// Release version, overriding the current git tag
    #[arg(long, value_name = "VERSION", env = "RELEASE_VERSION")]
    pub version_override: Option<String>,

    /// Snapshot release: no tag required, nothing is published
    #[arg(long)]
    pub snapshot: bool,

    /// Repository checkout to release
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        const STAGES: [&str; 2] = ["source", "upload"];
        if let Some(unknown) = self.skip.iter().find(|s| !STAGES.contains(&s.as_str())) {
            return Err(format!(
                "unknown stage '{unknown}' in --skip, expected one of: {}",
                STAGES.join(", ")
            ));
        }
        if let Some(version) = &self.version_override
            && version.trim().is_empty()
        {
            return Err("--version-override must not be empty".to_string());
        }
        Ok(())
    }

    /// Stages to skip, with `upload` implied by snapshot releases
    pub fn skipped_stages(&self) -> Vec<String> {
        let mut skips = self.skip.clone();
        if self.snapshot && !skips.iter().any(|s| s == "upload") {
            skips.push("upload".to_string());
        }
        skips
    }
}
