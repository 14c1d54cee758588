//! # Release Pipeline
//!
//! Stage-driven release automation: a shared release context flows through an
//! ordered list of stages that produce and publish artifacts.
//!
//! ## Features
//!
//! - **Pipeline runner**: per-stage skip, defaulting and run phases, with skip
//!   signals kept distinct from failures
//! - **Templates**: handlebars templates over release metadata and environment
//! - **Artifact registry**: thread-safe, append-only, queryable by type, group and format
//! - **Source archives**: `git archive` snapshots in zip, tar, tgz or tar.gz, with
//!   extra files appended under the same prefix
//! - **HTTP uploads**: mode-based artifact selection, basic auth from the environment,
//!   custom trust bundles, mutual TLS and checksum headers
//!
//! ## Usage
//!
//! ```bash
//! kodegen_release_pipeline                          # release the current tag
//! kodegen_release_pipeline --snapshot               # build without publishing
//! kodegen_release_pipeline --skip upload --dist out # archive only
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod archive;
pub mod artifact;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod source;
pub mod tmpl;
pub mod upload;

// Re-export main types for public API
pub use artifact::{Artifact, ArtifactFilter, ArtifactType, Artifacts};
pub use cli::Args;
pub use config::{Project, SourceConfig, Upload};
pub use context::{Context, Env, GitInfo};
pub use error::{ReleaseError, Result, SkipReason, is_skip};
pub use pipeline::{Pipe, Pipeline, PipelineReport, StageOutcome};
pub use source::SourcePipe;
pub use tmpl::Template;
pub use upload::HttpUploadPipe;
