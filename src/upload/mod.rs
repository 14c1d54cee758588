//! HTTP upload stage.
//!
//! Every configured target is handled in order: its skip predicate is evaluated,
//! its configuration validated, candidate artifacts selected, and each candidate
//! sent as one request. Requests for a single target run concurrently, bounded by
//! the project's parallelism. All templates are resolved before the first request
//! goes out, so a template or configuration problem never leaves a target half
//! uploaded.

mod check;
mod client;
mod select;
mod transfer;

pub use check::{check_config, env_key, resolve_secret, resolve_username};
pub use client::parse_trusted_certificates;
pub use select::{candidates, mode_types};
pub use transfer::{
    Asset, AssetOpener, FsAssetOpener, ResponseChecker, SuccessStatus, destination,
};

use crate::config::{MODE_ARCHIVE, Upload};
use crate::context::Context;
use crate::error::{ConfigError, ReleaseError, Result, TransferFailure, UploadError};
use crate::pipeline::Pipe;
use crate::tmpl::Template;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use transfer::TransferRequest;

/// Environment prefix of upload credentials: `UPLOAD_<NAME>_USERNAME` / `UPLOAD_<NAME>_SECRET`
pub const KIND: &str = "upload";

/// Default HTTP method
pub const DEFAULT_METHOD: &str = "PUT";

/// Fill unset upload fields. Idempotent.
pub fn defaults(uploads: &mut [Upload]) {
    for upload in uploads {
        if upload.mode.is_empty() {
            upload.mode = MODE_ARCHIVE.to_string();
        }
        if upload.method.is_empty() {
            upload.method = DEFAULT_METHOD.to_string();
        }
    }
}

/// Publishes artifacts to every configured HTTP target
#[derive(Clone)]
pub struct HttpUploadPipe {
    opener: Arc<dyn AssetOpener>,
    checker: Arc<dyn ResponseChecker>,
}

impl std::fmt::Debug for HttpUploadPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUploadPipe").finish_non_exhaustive()
    }
}

impl Default for HttpUploadPipe {
    fn default() -> Self {
        Self::new(Arc::new(FsAssetOpener), Arc::new(SuccessStatus))
    }
}

impl HttpUploadPipe {
    /// Stage with injected asset access and response classification
    pub fn new(opener: Arc<dyn AssetOpener>, checker: Arc<dyn ResponseChecker>) -> Self {
        Self { opener, checker }
    }
}

#[async_trait]
impl Pipe for HttpUploadPipe {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn description(&self) -> &'static str {
        "http uploads"
    }

    fn skip(&self, ctx: &Context) -> bool {
        ctx.config.uploads.is_empty()
    }

    async fn default(&self, ctx: &mut Context) -> Result<()> {
        defaults(&mut ctx.config.uploads);
        Ok(())
    }

    async fn run(&self, ctx: &mut Context) -> Result<()> {
        let ctx: &Context = ctx;
        upload(
            ctx,
            &ctx.config.uploads,
            KIND,
            Arc::clone(&self.opener),
            Arc::clone(&self.checker),
        )
        .await
    }
}

/// Upload to every target in order.
///
/// Stops at the first target that fails. When every non-skipped target
/// succeeds but some were skipped, returns a skip error naming them.
pub async fn upload(
    ctx: &Context,
    uploads: &[Upload],
    kind: &str,
    opener: Arc<dyn AssetOpener>,
    checker: Arc<dyn ResponseChecker>,
) -> Result<()> {
    let tmpl = Template::new(ctx);
    let mut skipped = Vec::new();

    for upload in uploads {
        if tmpl.apply_bool(&upload.skip)? {
            log::info!("{kind} '{}': skipped by configuration", upload.name);
            skipped.push(upload.name.clone());
            continue;
        }
        check_config(ctx, upload, kind)?;
        upload_target(ctx, upload, kind, &opener, &checker).await?;
    }

    if skipped.is_empty() {
        Ok(())
    } else {
        Err(ReleaseError::skip(format!(
            "{kind} skipped for: {}",
            skipped.join(", ")
        )))
    }
}

async fn upload_target(
    ctx: &Context,
    upload: &Upload,
    kind: &str,
    opener: &Arc<dyn AssetOpener>,
    checker: &Arc<dyn ResponseChecker>,
) -> Result<()> {
    let artifacts = candidates(ctx, upload)?;
    if artifacts.is_empty() {
        log::info!("{kind} '{}': no artifacts to upload", upload.name);
        return Ok(());
    }

    let method_name = if upload.method.is_empty() {
        DEFAULT_METHOD
    } else {
        upload.method.as_str()
    };
    let method = reqwest::Method::from_bytes(method_name.as_bytes()).map_err(|_| {
        ConfigError::InvalidValue {
            section: kind.to_string(),
            name: upload.name.clone(),
            field: "method".to_string(),
            value: upload.method.clone(),
            expected: "an HTTP method".to_string(),
        }
    })?;
    let username = resolve_username(ctx, upload, kind);
    let secret = resolve_secret(ctx, upload, kind).unwrap_or_default();
    let checksum_header = transfer::checksum_header(upload)?;

    let mut requests = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        let tmpl = Template::new(ctx).with_artifact(artifact);
        requests.push(TransferRequest {
            artifact: artifact.name.clone(),
            path: artifact.path.clone(),
            url: destination(&tmpl, upload, &artifact.name)?,
            method: method.clone(),
            headers: transfer::headers(&tmpl, upload)?,
            username: username.clone(),
            secret: secret.clone(),
            checksum_header: checksum_header.clone(),
        });
    }

    let client = client::build(upload)?;
    let permits = Arc::new(Semaphore::new(ctx.config.effective_parallelism()));
    let mut tasks = JoinSet::new();

    for request in requests {
        let client = client.clone();
        let permits = Arc::clone(&permits);
        let opener = Arc::clone(opener);
        let checker = Arc::clone(checker);
        let target = upload.name.clone();
        tasks.spawn(async move {
            let artifact = request.artifact.clone();
            let url = request.url.to_string();
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| TransferFailure {
                    artifact: artifact.clone(),
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            log::info!("{target}: uploading {artifact} to {url}");
            transfer::send(&client, request, opener.as_ref(), checker.as_ref())
                .await
                .map_err(|reason| TransferFailure {
                    artifact: artifact.clone(),
                    url: url.clone(),
                    reason,
                })?;
            log::debug!("{target}: uploaded {artifact}");
            Ok::<_, TransferFailure>(())
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                log::error!(
                    "{}: failed to upload {} to {}: {}",
                    upload.name,
                    failure.artifact,
                    failure.url,
                    failure.reason
                );
                failures.push(failure);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(UploadError::Transfers {
            target: upload.name.clone(),
            failures,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MODE_BINARY;

    #[test]
    fn defaults_are_idempotent_and_keep_user_values() {
        let mut uploads = vec![
            Upload::default(),
            Upload {
                mode: MODE_BINARY.into(),
                method: "POST".into(),
                ..Default::default()
            },
        ];
        defaults(&mut uploads);
        let first = uploads.clone();
        defaults(&mut uploads);
        assert_eq!(uploads, first);
        assert_eq!(uploads[0].mode, MODE_ARCHIVE);
        assert_eq!(uploads[0].method, DEFAULT_METHOD);
        assert_eq!(uploads[1].mode, MODE_BINARY);
        assert_eq!(uploads[1].method, "POST");
    }
}
