//! Candidate artifact selection for an upload target.

use crate::archive;
use crate::artifact::{Artifact, ArtifactFilter, ArtifactType};
use crate::config::{MODE_BINARY, Upload};
use crate::context::Context;
use crate::error::{ArchiveError, ConfigError, Result};
use crate::tmpl::Template;
use std::collections::BTreeSet;

/// Primary artifact types admitted by a mode
pub fn mode_types(mode: &str) -> Vec<ArtifactType> {
    if mode == MODE_BINARY {
        vec![ArtifactType::UploadableBinary]
    } else {
        vec![
            ArtifactType::LinuxPackage,
            ArtifactType::UploadableArchive,
            ArtifactType::UploadableSourceArchive,
        ]
    }
}

fn sidecar_types(upload: &Upload) -> Vec<ArtifactType> {
    let mut types = Vec::new();
    if upload.checksum {
        types.push(ArtifactType::Checksum);
    }
    if upload.signature {
        types.extend([ArtifactType::Signature, ArtifactType::Certificate]);
    }
    if upload.meta {
        types.push(ArtifactType::Metadata);
    }
    types
}

/// Artifacts to transfer for a target, in registry order followed by extra files
pub fn candidates(ctx: &Context, upload: &Upload) -> Result<Vec<Artifact>> {
    if upload.extra_files_only {
        return extra_files(ctx, upload);
    }

    let mut filters = vec![ArtifactFilter::ByType(mode_types(&upload.mode))];
    if !upload.ids.is_empty() {
        filters.push(ArtifactFilter::by_ids(&upload.ids));
    }
    if !upload.exts.is_empty() {
        filters.push(ArtifactFilter::by_ext(&upload.exts));
    }
    let mut selected = ctx.artifacts.filter(&ArtifactFilter::And(filters));

    let sidecars = sidecar_types(upload);
    if !sidecars.is_empty() {
        let groups: BTreeSet<String> = selected
            .iter()
            .filter_map(|a| a.id().map(str::to_string))
            .collect();
        selected.extend(
            ctx.artifacts
                .filter(&ArtifactFilter::ByType(sidecars))
                .into_iter()
                .filter(|a| a.id().is_none_or(|id| groups.contains(id))),
        );
    }

    selected.extend(extra_files(ctx, upload)?);
    Ok(selected)
}

/// Files matched by the target's extra-file globs, named by base name or template
fn extra_files(ctx: &Context, upload: &Upload) -> Result<Vec<Artifact>> {
    let tmpl = Template::new(ctx);
    let mut files: Vec<Artifact> = Vec::new();

    for extra in &upload.extra_files {
        let pattern = tmpl.apply(&extra.glob)?;
        let paths = archive::expand(&pattern)?;
        if paths.is_empty() {
            return Err(ArchiveError::NoMatch { pattern }.into());
        }
        if !extra.name_template.is_empty() && paths.len() > 1 {
            return Err(ConfigError::Misconfigured {
                section: "upload".to_string(),
                name: upload.name.clone(),
                reason: format!(
                    "extra file name_template requires {pattern} to match a single file, got {}",
                    paths.len()
                ),
            }
            .into());
        }

        for path in paths {
            let name = if extra.name_template.is_empty() {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            } else {
                tmpl.apply(&extra.name_template)?
            };
            if files.iter().any(|f| f.name == name) {
                log::warn!("upload '{}': ignoring duplicate extra file {name}", upload.name);
                continue;
            }
            files.push(Artifact::new(name, path, ArtifactType::UploadableFile));
        }
    }

    Ok(files)
}
