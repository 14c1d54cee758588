//! Single-artifact transfer: asset opening, request building, response checks.

use crate::config::Upload;
use crate::error::{ErrorExt, Result, UploadError};
use crate::tmpl::Template;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;
use url::Url;

/// An opened asset ready to be sent as a request body
pub struct Asset {
    /// Body stream
    pub reader: Pin<Box<dyn AsyncRead + Send + Sync>>,
    /// Exact byte count, sent as `Content-Length`
    pub size: u64,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset").field("size", &self.size).finish()
    }
}

/// Opens artifact files at transfer time
#[async_trait]
pub trait AssetOpener: Send + Sync {
    /// Open the file at `path` for sending
    async fn open(&self, path: &Path) -> Result<Asset>;
}

/// [`AssetOpener`] reading from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAssetOpener;

#[async_trait]
impl AssetOpener for FsAssetOpener {
    async fn open(&self, path: &Path) -> Result<Asset> {
        let metadata = tokio::fs::metadata(path)
            .await
            .fs_context("reading asset metadata", path)?;
        if metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::IsADirectory,
                "asset is a directory",
            ))
            .fs_context("opening asset", path);
        }
        let file = tokio::fs::File::open(path)
            .await
            .fs_context("opening asset", path)?;
        Ok(Asset {
            reader: Box::pin(file),
            size: metadata.len(),
        })
    }
}

/// Classifies a response as success or failure
pub trait ResponseChecker: Send + Sync {
    /// `Err` carries a description of why the response is a failure
    fn check(&self, response: &reqwest::Response) -> std::result::Result<(), String>;
}

/// [`ResponseChecker`] accepting any 2xx status
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessStatus;

impl ResponseChecker for SuccessStatus {
    fn check(&self, response: &reqwest::Response) -> std::result::Result<(), String> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("unexpected http response status: {status}"))
        }
    }
}

/// Destination URL: resolved target plus the artifact name as one escaped path segment
pub fn destination(tmpl: &Template<'_>, upload: &Upload, name: &str) -> Result<Url> {
    let raw = tmpl.apply(&upload.target)?;
    let invalid = |reason: String| UploadError::InvalidUrl {
        target: upload.name.clone(),
        url: raw.clone(),
        reason,
    };

    let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot be a base".to_string()))?
        .pop_if_empty()
        .push(name);
    Ok(url)
}

/// Resolve custom header templates; an empty rendered value drops the header
pub fn headers(tmpl: &Template<'_>, upload: &Upload) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, template) in &upload.custom_headers {
        let value = tmpl.apply(template)?;
        if value.is_empty() {
            continue;
        }
        let invalid = |reason: String| UploadError::InvalidHeader {
            target: upload.name.clone(),
            header: name.clone(),
            reason,
        };
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_str(&value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

/// Header receiving the body's SHA-256, when configured
pub fn checksum_header(upload: &Upload) -> Result<Option<HeaderName>> {
    if upload.checksum_header.is_empty() {
        return Ok(None);
    }
    HeaderName::from_bytes(upload.checksum_header.as_bytes())
        .map(Some)
        .map_err(|e| {
            UploadError::InvalidHeader {
                target: upload.name.clone(),
                header: upload.checksum_header.clone(),
                reason: e.to_string(),
            }
            .into()
        })
}

/// A fully resolved request, built before any transfer starts
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub artifact: String,
    pub path: std::path::PathBuf,
    pub url: Url,
    pub method: reqwest::Method,
    pub headers: HeaderMap,
    pub username: Option<String>,
    pub secret: String,
    pub checksum_header: Option<HeaderName>,
}

/// Send one artifact; failures are described as text for aggregation
pub async fn send(
    client: &reqwest::Client,
    request: TransferRequest,
    opener: &dyn AssetOpener,
    checker: &dyn ResponseChecker,
) -> std::result::Result<(), String> {
    let asset = opener
        .open(&request.path)
        .await
        .map_err(|e| e.to_string())?;

    let mut builder = client
        .request(request.method, request.url)
        .headers(request.headers);
    if let Some(username) = request.username {
        builder = builder.basic_auth(username, Some(request.secret));
    }

    builder = match request.checksum_header {
        Some(header) => {
            let body = read_all(asset).await?;
            let sum = hex::encode(Sha256::digest(&body));
            builder
                .header(header, sum)
                .header(CONTENT_LENGTH, body.len())
                .body(body)
        }
        None => builder
            .header(CONTENT_LENGTH, asset.size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(asset.reader))),
    };

    let response = builder.send().await.map_err(|e| error_chain(&e))?;
    checker.check(&response)
}

async fn read_all(mut asset: Asset) -> std::result::Result<Bytes, String> {
    let mut body = Vec::with_capacity(usize::try_from(asset.size).unwrap_or_default());
    asset
        .reader
        .read_to_end(&mut body)
        .await
        .map_err(|e| format!("reading asset: {e}"))?;
    Ok(Bytes::from(body))
}

/// Flatten an error and its sources into one line
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Project;
    use crate::context::{Context, Env};

    fn ctx() -> Context {
        Context::with_env(
            Project {
                project_name: "blah".into(),
                ..Default::default()
            },
            Env::default(),
        )
        .unwrap()
        .with_version("1.0.0")
    }

    fn upload(target: &str) -> Upload {
        Upload {
            name: "a".into(),
            target: target.into(),
            ..Default::default()
        }
    }

    #[test]
    fn trailing_separator_is_idempotent() {
        let ctx = ctx();
        let tmpl = Template::new(&ctx);
        let a = destination(&tmpl, &upload("http://h/v"), "a.tar.gz").unwrap();
        let b = destination(&tmpl, &upload("http://h/v/"), "a.tar.gz").unwrap();
        assert_eq!(a.as_str(), "http://h/v/a.tar.gz");
        assert_eq!(a, b);
    }

    #[test]
    fn name_is_escaped_as_one_segment() {
        let ctx = ctx();
        let tmpl = Template::new(&ctx);
        let url = destination(&tmpl, &upload("http://h/{{ ProjectName }}"), "a b#c.txt").unwrap();
        assert_eq!(url.as_str(), "http://h/blah/a%20b%23c.txt");
    }

    #[test]
    fn unparseable_target_fails() {
        let ctx = ctx();
        let err = destination(&Template::new(&ctx), &upload("not a url"), "a").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ReleaseError::Upload(UploadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn headers_are_templated() {
        let ctx = ctx();
        let mut upload = upload("http://h");
        upload
            .custom_headers
            .insert("x-project-name".into(), "{{ ProjectName }}".into());
        let headers = headers(&Template::new(&ctx), &upload).unwrap();
        assert_eq!(headers["x-project-name"], "blah");
    }

    #[tokio::test]
    async fn directories_are_not_assets() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsAssetOpener.open(dir.path()).await.is_err());
        assert!(FsAssetOpener.open(&dir.path().join("missing")).await.is_err());

        let file = dir.path().join("a.txt");
        std::fs::write(&file, "blah!").unwrap();
        assert_eq!(FsAssetOpener.open(&file).await.unwrap().size, 5);
    }
}
