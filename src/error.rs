//! Error types for release pipeline operations.
//!
//! This module defines the error taxonomy with actionable messages and recovery
//! suggestions. Skip signals are a distinguished variant so the pipeline runner can
//! tell "intentionally did not run" apart from "failed" without inspecting messages.

use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release pipeline operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release pipeline operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// A stage or unit of work intentionally did not run
    #[error("skipped: {0}")]
    Skip(SkipReason),

    /// A fatal failure inside a pipeline stage, labelled with the stage name
    #[error("{stage}: {source}")]
    Pipe {
        /// Stage label
        stage: String,
        /// Underlying failure
        #[source]
        source: Box<ReleaseError>,
    },

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Template resolution errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Archive creation errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Upload errors
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Git collaborator errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// File system error with path context
    #[error("{context} {path}: {error}")]
    Fs {
        /// Operation being performed (e.g. "opening archive")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        error: std::io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Background task failed to complete
    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a unit of work was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason {
    message: String,
}

impl SkipReason {
    /// Create a skip reason with a human readable message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The human readable message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Configuration errors, raised before any network or file activity
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field is missing
    #[error("{section} '{name}': {field} is required")]
    MissingField {
        /// Config section (e.g. "upload")
        section: String,
        /// Entity name, may be empty
        name: String,
        /// Field name
        field: String,
    },

    /// An enumerated field holds an unrecognized value
    #[error("{section} '{name}': invalid {field} '{value}', expected one of: {expected}")]
    InvalidValue {
        /// Config section
        section: String,
        /// Entity name
        name: String,
        /// Field name
        field: String,
        /// Offending value
        value: String,
        /// Accepted values
        expected: String,
    },

    /// An entity is inconsistent in a way not covered above
    #[error("{section} '{name}' is misconfigured: {reason}")]
    Misconfigured {
        /// Config section
        section: String,
        /// Entity name
        name: String,
        /// Reason for the error
        reason: String,
    },

    /// A configured username has no secret in the environment
    #[error("{section} '{name}': missing secret: {key} is not set")]
    MissingSecret {
        /// Config section
        section: String,
        /// Entity name
        name: String,
        /// Environment variable expected to hold the secret
        key: String,
    },

    /// Config file could not be located
    #[error("config file not found at {path}")]
    NotFound {
        /// Path that was probed
        path: PathBuf,
    },
}

/// Template resolution errors
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template is syntactically malformed
    #[error("failed to parse template '{template}': {reason}")]
    Parse {
        /// Offending template
        template: String,
        /// Parser message
        reason: String,
    },

    /// Template references an undefined field or fails while rendering
    #[error("failed to render template '{template}': {reason}")]
    Render {
        /// Offending template
        template: String,
        /// Renderer message
        reason: String,
    },
}

/// Archive creation and rewrite errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Format is not one of the supported values
    #[error("invalid archive format: {0}")]
    InvalidFormat(String),

    /// Entry name already present in the archive
    #[error("could not add {destination:?} to archive: entry already exists")]
    DuplicateEntry {
        /// Entry name inside the archive
        destination: String,
    },

    /// Glob pattern matched no files
    #[error("globbing failed for pattern {pattern}: no files matched")]
    NoMatch {
        /// Pattern after template resolution
        pattern: String,
    },

    /// Glob pattern is invalid
    #[error("invalid glob pattern {pattern}: {reason}")]
    Pattern {
        /// Pattern after template resolution
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// Zip reader or writer failed
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    /// The snapshot collaborator failed
    #[error("snapshot failed: {0}")]
    Snapshot(String),
}

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// Trusted certificate bundle could not be parsed
    #[error("upload '{target}': invalid trusted_certificates: {reason}")]
    InvalidTrustedCerts {
        /// Upload target name
        target: String,
        /// Parser message
        reason: String,
    },

    /// Client certificate or key could not be loaded
    #[error("upload '{target}': invalid client certificate: {reason}")]
    InvalidClientCert {
        /// Upload target name
        target: String,
        /// Reason for the error
        reason: String,
    },

    /// HTTP client could not be constructed
    #[error("upload '{target}': failed to build http client: {source}")]
    Client {
        /// Upload target name
        target: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Resolved destination is not a valid URL
    #[error("upload '{target}': invalid destination URL '{url}': {reason}")]
    InvalidUrl {
        /// Upload target name
        target: String,
        /// Resolved URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// Invalid header name or value
    #[error("upload '{target}': invalid header '{header}': {reason}")]
    InvalidHeader {
        /// Upload target name
        target: String,
        /// Header name
        header: String,
        /// Reason for the error
        reason: String,
    },

    /// One or more transfers failed
    #[error("upload '{target}' failed: {}", format_failures(.failures))]
    Transfers {
        /// Upload target name
        target: String,
        /// Every failed transfer, in completion order
        failures: Vec<TransferFailure>,
    },
}

/// A single failed artifact transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    /// Artifact name
    pub artifact: String,
    /// Destination URL
    pub url: String,
    /// Transport, TLS, or status failure description
    pub reason: String,
}

fn format_failures(failures: &[TransferFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} -> {}: {}", f.artifact, f.url, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Git collaborator errors
#[derive(Error, Debug)]
pub enum GitError {
    /// git executable not found
    #[error("git executable not found in PATH")]
    NotInstalled,

    /// Not a git repository
    #[error("Not a git repository. Please initialize git first.")]
    NotRepository,

    /// Git command failed
    #[error("git {command} failed: {reason}")]
    CommandFailed {
        /// Git sub-command
        command: String,
        /// stderr or spawn failure
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Wrap a fatal error with the label of the stage that produced it
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        ReleaseError::Pipe {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Construct a skip signal
    pub fn skip(message: impl Into<String>) -> Self {
        ReleaseError::Skip(SkipReason::new(message))
    }

    /// Check if this error is a skip signal rather than a failure
    pub fn is_skip(&self) -> bool {
        match self {
            ReleaseError::Skip(_) => true,
            ReleaseError::Pipe { source, .. } => source.is_skip(),
            _ => false,
        }
    }

    /// Skip reason, if this error is a skip signal
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            ReleaseError::Skip(reason) => Some(reason),
            ReleaseError::Pipe { source, .. } => source.skip_reason(),
            _ => None,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Pipe { source, .. } => source.recovery_suggestions(),
            ReleaseError::Config(ConfigError::NotFound { path }) => vec![
                format!("Create a config file at {}", path.display()),
                "Pass an explicit path with --config".to_string(),
            ],
            ReleaseError::Config(ConfigError::MissingSecret { key, .. }) => vec![
                format!("Export {key} before releasing"),
                "Secrets are read from the environment only, never from config".to_string(),
            ],
            ReleaseError::Template(_) => vec![
                "Check field names in the template (e.g. {{ ProjectName }}, {{ Env.NAME }})"
                    .to_string(),
                "Use {{ env_or \"NAME\" \"default\" }} for optional environment lookups"
                    .to_string(),
            ],
            ReleaseError::Upload(UploadError::InvalidTrustedCerts { .. }) => vec![
                "trusted_certificates must hold one or more PEM encoded CERTIFICATE blocks"
                    .to_string(),
            ],
            ReleaseError::Upload(UploadError::Transfers { .. }) => vec![
                "Artifacts uploaded before the failure were not rolled back".to_string(),
                "Re-run the release once the endpoint is reachable".to_string(),
            ],
            ReleaseError::Git(GitError::NotInstalled) => {
                vec!["Install git and make sure it is on PATH".to_string()]
            }
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

/// Check if an error is a skip signal.
///
/// Free-function form for call sites that hold a borrowed error.
pub fn is_skip(err: &ReleaseError) -> bool {
    err.is_skip()
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating archive".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| ReleaseError::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}
