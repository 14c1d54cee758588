//! Command line interface for the release pipeline.
//!
//! Loads the configuration, builds the release context from the git checkout,
//! runs the default pipeline and prints a per-stage summary.

mod args;
mod output;

pub use args::Args;
pub use output::OutputManager;

use crate::config::Project;
use crate::context::{Context, GitInfo};
use crate::error::{CliError, Result};
use crate::git::{GitCli, Snapshotter};
use crate::pipeline::Pipeline;
use crate::source::SourcePipe;
use crate::upload::HttpUploadPipe;
use std::sync::Arc;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    execute(Args::parse_args()).await
}

/// The stages run by the binary, in order
pub fn default_pipeline(snapshotter: Arc<dyn Snapshotter>) -> Pipeline {
    Pipeline::new()
        .with_pipe(SourcePipe::new(snapshotter))
        .with_pipe(HttpUploadPipe::default())
}

/// Execute a parsed command line and return the process exit code
pub async fn execute(args: Args) -> Result<i32> {
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;
    let output = OutputManager::new(args.verbose, args.quiet);

    let config_path = if args.config.is_relative() {
        args.repo.join(&args.config)
    } else {
        args.config.clone()
    };
    output.verbose(&format!("loading {}", config_path.display()))?;
    let mut config = Project::load(&config_path)?;
    if let Some(dist) = &args.dist {
        config.dist = dist.clone();
    }

    let git = GitCli::new()?;
    let info = git.discover(&args.repo)?;
    let version = resolve_version(&args, &info)?;

    let mut ctx = Context::new(config)?
        .with_git(info.clone())
        .with_repo_dir(&args.repo)
        .with_skips(args.skipped_stages());
    if args.version_override.is_none() && !info.current_tag.is_empty() {
        ctx = ctx.with_tag(info.current_tag);
    }
    ctx = ctx.with_version(version);
    ctx.snapshot = args.snapshot;

    output.info(&format!(
        "releasing {} {} ({})",
        ctx.config.project_name, ctx.version, ctx.git.short_commit
    ))?;

    let pipeline = default_pipeline(Arc::new(git));
    let report = pipeline.run(&mut ctx).await?;
    output.report(&report)?;
    for artifact in ctx.artifacts.list() {
        output.verbose(&format!("{} {}", artifact.kind, artifact.path.display()))?;
    }

    Ok(0)
}

fn resolve_version(args: &Args, info: &GitInfo) -> Result<String> {
    if let Some(version) = &args.version_override {
        return Ok(version.clone());
    }
    if args.snapshot {
        let base = if info.current_tag.is_empty() {
            "0.0.0"
        } else {
            info.current_tag.as_str()
        };
        let base = base.strip_prefix('v').unwrap_or(base);
        return Ok(format!("{base}-SNAPSHOT-{}", info.short_commit));
    }
    if info.current_tag.is_empty() {
        return Err(CliError::InvalidArguments {
            reason: "no git tag found; tag the release commit, pass --version-override, or use --snapshot"
                .to_string(),
        }
        .into());
    }
    Ok(info.current_tag.clone())
}
