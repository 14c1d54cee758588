//! Source archive stage.
//!
//! Snapshots the release commit into `dist/<name>.<format>`, appends any extra
//! files the user listed, and registers the result as an uploadable source archive.

use crate::archive::{self, Archive, ArchiveFile, ArchiveFormat};
use crate::artifact::{Artifact, ArtifactType};
use crate::context::Context;
use crate::error::{ArchiveError, ErrorExt, ReleaseError, Result};
use crate::git::{SnapshotRequest, Snapshotter};
use crate::pipeline::Pipe;
use crate::tmpl::Template;
use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default source archive format
pub const DEFAULT_FORMAT: &str = "tar.gz";

/// Default source archive base name
pub const DEFAULT_NAME_TEMPLATE: &str = "{{ ProjectName }}-{{ Version }}";

/// Builds the source archive through a [`Snapshotter`]
pub struct SourcePipe {
    snapshotter: Arc<dyn Snapshotter>,
}

impl std::fmt::Debug for SourcePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePipe").finish_non_exhaustive()
    }
}

impl SourcePipe {
    /// Stage snapshotting through `snapshotter`
    pub fn new(snapshotter: Arc<dyn Snapshotter>) -> Self {
        Self { snapshotter }
    }
}

#[async_trait]
impl Pipe for SourcePipe {
    fn name(&self) -> &'static str {
        "source"
    }

    fn description(&self) -> &'static str {
        "creating source archive"
    }

    fn skip(&self, ctx: &Context) -> bool {
        !ctx.config.source.enabled
    }

    async fn default(&self, ctx: &mut Context) -> Result<()> {
        let source = &mut ctx.config.source;
        if source.format.is_empty() {
            source.format = DEFAULT_FORMAT.to_string();
        }
        if source.name_template.is_empty() {
            source.name_template = DEFAULT_NAME_TEMPLATE.to_string();
        }
        Ok(())
    }

    async fn run(&self, ctx: &mut Context) -> Result<()> {
        let source = &ctx.config.source;
        let format: ArchiveFormat = source.format.parse()?;

        let tmpl = Template::new(ctx);
        let name = tmpl.apply(&source.name_template)?;
        let prefix = tmpl.apply(&source.prefix_template)?;
        let files = archive::evaluate(&tmpl, &source.files)?;

        let dist = ctx.dist();
        tokio::fs::create_dir_all(&dist)
            .await
            .fs_context("creating dist directory", &dist)?;

        let filename = format!("{name}.{format}");
        // git runs inside the repository, so the output path must not be relative.
        let path = std::path::absolute(dist.join(&filename))
            .fs_context("resolving source archive path", dist.join(&filename))?;

        let commit = if ctx.git.full_commit.is_empty() {
            "HEAD".to_string()
        } else {
            ctx.git.full_commit.clone()
        };
        let request = SnapshotRequest {
            repo_dir: ctx.repo_dir.clone(),
            commit,
            prefix: prefix.clone(),
            output: path.clone(),
            format,
        };

        log::info!("creating source archive {}", path.display());
        let snapshotter = Arc::clone(&self.snapshotter);
        tokio::task::spawn_blocking(move || snapshotter.snapshot(&request)).await??;

        if !files.is_empty() {
            let target = path.clone();
            tokio::task::spawn_blocking(move || append_files(&target, format, &prefix, files))
                .await??;
        }

        ctx.artifacts.add(
            Artifact::new(filename, path, ArtifactType::UploadableSourceArchive)
                .with_format(format.as_str()),
        );
        Ok(())
    }
}

/// Rewrite `path` with `files` appended under `prefix`
fn append_files(
    path: &Path,
    format: ArchiveFormat,
    prefix: &str,
    files: Vec<ArchiveFile>,
) -> Result<()> {
    let backup = PathBuf::from(format!("{}.bkp", path.display()));
    std::fs::rename(path, &backup).fs_context("backing up source archive", path)?;

    let original = File::open(&backup).fs_context("opening source archive backup", &backup)?;
    let output = File::create(path).fs_context("creating source archive", path)?;

    let mut archive = Archive::copy_from(BufReader::new(original), output, format)?;
    for file in files {
        let destination = archive::join_prefix(prefix, &file.destination);
        archive.add(&ArchiveFile {
            destination,
            ..file
        })?;
    }
    archive
        .finish()?
        .sync_all()
        .fs_context("writing source archive", path)?;

    std::fs::remove_file(&backup).fs_context("removing source archive backup", &backup)?;
    Ok(())
}

/// [`Snapshotter`] failure carrying a plain message
pub fn snapshot_error(reason: impl Into<String>) -> ReleaseError {
    ArchiveError::Snapshot(reason.into()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::list_entries;
    use crate::config::{ArchiveExtraFile, Project, SourceConfig};
    use crate::context::Env;

    /// Archives a fixture directory instead of a commit
    struct DirSnapshotter {
        root: PathBuf,
    }

    impl Snapshotter for DirSnapshotter {
        fn snapshot(&self, request: &SnapshotRequest) -> Result<()> {
            let output = File::create(&request.output).map_err(|e| snapshot_error(e.to_string()))?;
            let mut archive = Archive::new(output, request.format);
            for name in ["README.md", "src/main.rs"] {
                let mut file = ArchiveFile::new(self.root.join(name), name);
                file.destination = archive::join_prefix(&request.prefix, name);
                archive.add(&file)?;
            }
            archive.finish()?;
            Ok(())
        }
    }

    struct FailingSnapshotter;

    impl Snapshotter for FailingSnapshotter {
        fn snapshot(&self, _request: &SnapshotRequest) -> Result<()> {
            Err(snapshot_error("fatal: not a valid object name"))
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("repo/src")).unwrap();
        std::fs::write(dir.path().join("repo/README.md"), "# readme").unwrap();
        std::fs::write(dir.path().join("repo/src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        dir
    }

    fn ctx(dir: &Path, source: SourceConfig) -> Context {
        let config = Project {
            project_name: "foo".into(),
            dist: dir.join("dist"),
            source,
            ..Default::default()
        };
        Context::with_env(config, Env::default())
            .unwrap()
            .with_version("1.0.0")
            .with_repo_dir(dir.join("repo"))
    }

    fn pipe(dir: &Path) -> SourcePipe {
        SourcePipe::new(Arc::new(DirSnapshotter {
            root: dir.join("repo"),
        }))
    }

    #[tokio::test]
    async fn every_format_with_prefix_and_extra_files() {
        for format in ArchiveFormat::ALL {
            let dir = fixture();
            let mut ctx = ctx(
                dir.path(),
                SourceConfig {
                    enabled: true,
                    format: format.as_str().to_string(),
                    prefix_template: "{{ ProjectName }}-{{ Version }}/".into(),
                    files: vec![ArchiveExtraFile {
                        src: format!("{}/LICENSE", dir.path().display()),
                        dst: "legal".into(),
                        strip_parent: true,
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            );
            let pipe = pipe(dir.path());
            pipe.default(&mut ctx).await.unwrap();
            pipe.run(&mut ctx).await.unwrap();

            let artifacts = ctx.artifacts.list();
            assert_eq!(artifacts.len(), 1);
            let artifact = &artifacts[0];
            assert_eq!(artifact.name, format!("foo-1.0.0.{format}"));
            assert_eq!(artifact.kind, ArtifactType::UploadableSourceArchive);
            assert_eq!(artifact.extra.format.as_deref(), Some(format.as_str()));
            assert!(artifact.path.is_absolute());

            let bytes = std::fs::read(&artifact.path).unwrap();
            assert_eq!(
                list_entries(&bytes, format),
                [
                    "foo-1.0.0/README.md",
                    "foo-1.0.0/src/main.rs",
                    "foo-1.0.0/legal/LICENSE"
                ],
                "{format}"
            );
            assert!(!PathBuf::from(format!("{}.bkp", artifact.path.display())).exists());
        }
    }

    #[tokio::test]
    async fn without_extra_files_archive_is_the_snapshot() {
        let dir = fixture();
        let mut ctx = ctx(
            dir.path(),
            SourceConfig {
                enabled: true,
                ..Default::default()
            },
        );
        let pipe = pipe(dir.path());
        pipe.default(&mut ctx).await.unwrap();
        pipe.run(&mut ctx).await.unwrap();

        let artifact = &ctx.artifacts.list()[0];
        assert_eq!(artifact.name, "foo-1.0.0.tar.gz");
        let bytes = std::fs::read(&artifact.path).unwrap();
        assert_eq!(
            list_entries(&bytes, ArchiveFormat::TarGz),
            ["README.md", "src/main.rs"]
        );
    }

    #[tokio::test]
    async fn invalid_format_fails_before_snapshot() {
        let dir = fixture();
        let mut ctx = ctx(
            dir.path(),
            SourceConfig {
                enabled: true,
                format: "7z".into(),
                ..Default::default()
            },
        );
        let err = pipe(dir.path()).run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ReleaseError::Archive(ArchiveError::InvalidFormat(ref f)) if f == "7z"));
        assert!(!dir.path().join("dist").exists());
        assert!(ctx.artifacts.is_empty());
    }

    #[tokio::test]
    async fn snapshot_failure_registers_nothing() {
        let dir = fixture();
        let mut ctx = ctx(
            dir.path(),
            SourceConfig {
                enabled: true,
                format: "zip".into(),
                name_template: "src".into(),
                ..Default::default()
            },
        );
        let err = SourcePipe::new(Arc::new(FailingSnapshotter))
            .run(&mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Archive(ArchiveError::Snapshot(_))));
        assert!(ctx.artifacts.is_empty());
    }

    #[tokio::test]
    async fn defaults_fill_only_unset_fields() {
        let dir = fixture();
        let mut ctx = ctx(
            dir.path(),
            SourceConfig {
                format: "zip".into(),
                ..Default::default()
            },
        );
        let pipe = pipe(dir.path());
        assert!(pipe.skip(&ctx));

        pipe.default(&mut ctx).await.unwrap();
        let first = ctx.config.source.clone();
        pipe.default(&mut ctx).await.unwrap();
        assert_eq!(ctx.config.source, first);
        assert_eq!(first.format, "zip");
        assert_eq!(first.name_template, DEFAULT_NAME_TEMPLATE);
    }
}
