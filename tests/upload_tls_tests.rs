//! HTTPS uploads against a local TLS server with a private certificate authority.

use kodegen_release_pipeline::config::{MODE_ARCHIVE, Project, Upload};
use kodegen_release_pipeline::error::{ReleaseError, UploadError};
use kodegen_release_pipeline::upload::{self, FsAssetOpener, SuccessStatus};
use kodegen_release_pipeline::{Artifact, ArtifactType, Context, Env, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig};

/// A CA plus a server and a client certificate it issued
struct Pki {
    ca_pem: String,
    ca_der: CertificateDer<'static>,
    server_cert: CertificateDer<'static>,
    server_key: Vec<u8>,
    client_cert_pem: String,
    client_key_pem: String,
}

fn pki() -> Pki {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    ca.distinguished_name.push(DnType::CommonName, "release test ca");
    let ca_cert = ca.self_signed(&ca_key).unwrap();

    let server_key = KeyPair::generate().unwrap();
    let mut server = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    server.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    let server_cert = server.signed_by(&server_key, &ca_cert, &ca_key).unwrap();

    let client_key = KeyPair::generate().unwrap();
    let mut client = CertificateParams::new(Vec::<String>::new()).unwrap();
    client.distinguished_name.push(DnType::CommonName, "release uploader");
    client.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let client_cert = client.signed_by(&client_key, &ca_cert, &ca_key).unwrap();

    Pki {
        ca_pem: ca_cert.pem(),
        ca_der: ca_cert.der().clone(),
        server_cert: server_cert.der().clone(),
        server_key: server_key.serialize_der(),
        client_cert_pem: client_cert.pem(),
        client_key_pem: client_key.serialize_pem(),
    }
}

fn server_config(pki: &Pki, require_client_cert: bool) -> ServerConfig {
    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .unwrap();
    let chain = vec![pki.server_cert.clone()];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pki.server_key.clone()));

    if require_client_cert {
        let mut roots = RootCertStore::empty();
        roots.add(pki.ca_der.clone()).unwrap();
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .unwrap();
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)
            .unwrap()
    } else {
        builder.with_no_client_auth().with_single_cert(chain, key).unwrap()
    }
}

struct TlsServer {
    url: String,
    received: Arc<AtomicUsize>,
}

/// Accept connections forever, answering every complete request with 201
async fn serve(config: ServerConfig) -> TlsServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let received = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&received);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(stream).await {
                    let _ = respond(stream, &counter).await;
                }
            });
        }
    });

    TlsServer {
        url: format!("https://localhost:{port}/uploads"),
        received,
    }
}

async fn respond<S>(stream: S, counter: &AtomicUsize) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await?;
    counter.fetch_add(1, Ordering::SeqCst);

    let mut stream = reader.into_inner();
    stream
        .write_all(b"HTTP/1.1 201 Created\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
        .await?;
    stream.shutdown().await
}

fn context(dir: &Path) -> Context {
    let config = Project {
        project_name: "blah".into(),
        ..Default::default()
    };
    let ctx = Context::with_env(config, Env::default())
        .unwrap()
        .with_version("1.0.0");
    let path = dir.join("app.tar.gz");
    std::fs::write(&path, "archive").unwrap();
    ctx.artifacts
        .add(Artifact::new("app.tar.gz", path, ArtifactType::UploadableArchive));
    ctx
}

fn target(server: &TlsServer) -> Upload {
    Upload {
        name: "tls".into(),
        target: server.url.clone(),
        mode: MODE_ARCHIVE.into(),
        ..Default::default()
    }
}

async fn run(ctx: &Context, config: Upload) -> Result<()> {
    upload::upload(
        ctx,
        &[config],
        "test",
        Arc::new(FsAssetOpener),
        Arc::new(SuccessStatus),
    )
    .await
}

fn single_failure(err: ReleaseError) -> String {
    match err {
        ReleaseError::Upload(UploadError::Transfers { target, failures }) => {
            assert_eq!(target, "tls");
            assert_eq!(failures.len(), 1, "{failures:?}");
            assert_eq!(failures[0].artifact, "app.tar.gz");
            failures[0].reason.clone()
        }
        other => panic!("expected a transfer failure, got {other:?}"),
    }
}

#[tokio::test]
async fn trusted_bundle_verifies_private_ca() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let server = serve(server_config(&pki, false)).await;
    let upload = Upload {
        trusted_certificates: pki.ca_pem.clone(),
        ..target(&server)
    };

    run(&context(dir.path()), upload).await.unwrap();
    assert_eq!(server.received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn without_bundle_private_ca_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let server = serve(server_config(&pki, false)).await;

    let err = run(&context(dir.path()), target(&server)).await.unwrap_err();
    let reason = single_failure(err);
    assert!(reason.contains("certificate"), "{reason}");
    assert_eq!(server.received.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn server_demanding_client_cert_rejects_anonymous_upload() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let server = serve(server_config(&pki, true)).await;
    let upload = Upload {
        trusted_certificates: pki.ca_pem.clone(),
        ..target(&server)
    };

    let err = run(&context(dir.path()), upload).await.unwrap_err();
    single_failure(err);
    assert_eq!(server.received.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn client_certificate_completes_mutual_tls() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let cert = dir.path().join("client.pem");
    let key = dir.path().join("client.key");
    std::fs::write(&cert, &pki.client_cert_pem).unwrap();
    std::fs::write(&key, &pki.client_key_pem).unwrap();

    let server = serve(server_config(&pki, true)).await;
    let upload = Upload {
        trusted_certificates: pki.ca_pem.clone(),
        client_x509_cert: cert.display().to_string(),
        client_x509_key: key.display().to_string(),
        ..target(&server)
    };

    run(&context(dir.path()), upload).await.unwrap();
    assert_eq!(server.received.load(Ordering::SeqCst), 1);
}
