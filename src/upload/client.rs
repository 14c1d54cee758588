//! HTTP client construction per upload target.

use crate::config::Upload;
use crate::error::{ErrorExt, Result, UploadError};
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use std::path::Path;

/// Parse a PEM bundle into certificates; a bundle without any certificate is invalid
pub fn parse_trusted_certificates(
    target: &str,
    pem: &str,
) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| UploadError::InvalidTrustedCerts {
            target: target.to_string(),
            reason: format!("{e:?}"),
        })?;
    if certs.is_empty() {
        return Err(UploadError::InvalidTrustedCerts {
            target: target.to_string(),
            reason: "no PEM certificate found".to_string(),
        }
        .into());
    }
    Ok(certs)
}

/// Build the client for a target.
///
/// A trusted bundle replaces the built-in roots entirely. A client certificate
/// and key are presented for mutual TLS when both are configured.
pub fn build(upload: &Upload) -> Result<reqwest::Client> {
    let target = upload.name.as_str();
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

    if !upload.trusted_certificates.is_empty() {
        builder = builder.tls_built_in_root_certs(false);
        for cert in parse_trusted_certificates(target, &upload.trusted_certificates)? {
            let cert = reqwest::Certificate::from_der(cert.as_ref()).map_err(|e| {
                UploadError::InvalidTrustedCerts {
                    target: target.to_string(),
                    reason: e.to_string(),
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }
    }

    if !upload.client_x509_cert.is_empty() && !upload.client_x509_key.is_empty() {
        builder = builder.identity(load_identity(
            target,
            Path::new(&upload.client_x509_cert),
            Path::new(&upload.client_x509_key),
        )?);
    }

    builder.build().map_err(|source| {
        UploadError::Client {
            target: target.to_string(),
            source,
        }
        .into()
    })
}

fn load_identity(target: &str, cert: &Path, key: &Path) -> Result<reqwest::Identity> {
    let mut pem = std::fs::read(cert).fs_context("reading client certificate", cert)?;
    pem.push(b'\n');
    pem.extend(std::fs::read(key).fs_context("reading client key", key)?);
    reqwest::Identity::from_pem(&pem).map_err(|e| {
        UploadError::InvalidClientCert {
            target: target.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
