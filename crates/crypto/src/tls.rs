//! HTTPS client construction with optional mTLS.
//!
//! Certificate material is checked with `rustls-pemfile` before it is handed
//! to `reqwest`, so a key file with no key in it fails with a message naming
//! the file instead of a generic builder error.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during TLS setup.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Failed to read a file from disk.
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    /// No certificates were found in the PEM file.
    #[error("no certificates found in {0}")]
    NoCertificates(String),

    /// No private key was found in the PEM file.
    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    /// The `reqwest` client could not be built.
    #[error("reqwest client error: {0}")]
    ReqwestBuild(String),
}

/// Settings for [`build_http_client`].
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    /// Trust anchor bundle added to the default roots.
    pub ca_cert: Option<PathBuf>,
    /// Skip server verification. Ignored when `ca_cert` is set.
    pub insecure: bool,
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            client_cert: None,
            client_key: None,
            ca_cert: None,
            insecure: false,
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|e| TlsError::FileRead {
        path: path.display().to_string(),
        source: e,
    })
}

/// Count the certificates in a PEM file, failing if there are none.
pub fn check_certs(path: &Path) -> Result<usize, TlsError> {
    let pem = read_pem(path)?;
    let mut reader = BufReader::new(pem.as_slice());
    let count = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?
        .len();

    if count == 0 {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(count)
}

/// Confirm a PEM file holds a PKCS#1, PKCS#8, or SEC1 private key.
pub fn check_private_key(path: &Path) -> Result<(), TlsError> {
    let pem = read_pem(path)?;
    let mut reader = BufReader::new(pem.as_slice());
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(TlsError::NoPrivateKey(path.display().to_string())),
        Err(e) => Err(TlsError::FileRead {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Build a pooled `reqwest::Client` over rustls.
///
/// - `ca_cert`: PEM bundle trusted in addition to the built-in roots.
/// - `client_cert` / `client_key`: presented for mTLS when both are set.
/// - `insecure`: disables server verification, only when no CA is given.
pub fn build_http_client(opts: &HttpClientOptions) -> Result<reqwest::Client, TlsError> {
    let accept_invalid = opts.insecure && opts.ca_cert.is_none();
    if opts.insecure && opts.ca_cert.is_some() {
        debug!("CA certificate provided; keeping server verification on");
    }
    if accept_invalid {
        warn!("TLS certificate verification disabled");
    }

    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(opts.timeout)
        .pool_max_idle_per_host(opts.pool_max_idle_per_host)
        .danger_accept_invalid_certs(accept_invalid);

    if let Some(ca_path) = &opts.ca_cert {
        check_certs(ca_path)?;
        let pem = read_pem(ca_path)?;
        let bundle = reqwest::Certificate::from_pem_bundle(&pem)
            .map_err(|e| TlsError::ReqwestBuild(format!("invalid CA bundle: {e}")))?;
        for cert in bundle {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let (Some(cert_path), Some(key_path)) = (&opts.client_cert, &opts.client_key) {
        check_certs(cert_path)?;
        check_private_key(key_path)?;

        let mut combined = read_pem(cert_path)?;
        combined.push(b'\n');
        combined.extend_from_slice(&read_pem(key_path)?);

        let identity = reqwest::Identity::from_pem(&combined)
            .map_err(|e| TlsError::ReqwestBuild(format!("invalid client identity: {e}")))?;
        builder = builder.identity(identity);
        debug!(cert = %cert_path.display(), "mTLS client identity loaded");
    }

    builder
        .build()
        .map_err(|e| TlsError::ReqwestBuild(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pem_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn check_certs_nonexistent_file() {
        let err = check_certs(Path::new("/nonexistent/path.pem")).unwrap_err();
        assert!(matches!(err, TlsError::FileRead { .. }));
    }

    #[test]
    fn check_certs_rejects_file_without_certificates() {
        let file = pem_file("not a pem file\n");
        let err = check_certs(file.path()).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[test]
    fn check_private_key_rejects_certificate_only_file() {
        let file = pem_file("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n");
        let err = check_private_key(file.path()).unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey(_)));
    }

    #[test]
    fn default_client_builds() {
        build_http_client(&HttpClientOptions::default()).unwrap();
    }

    #[test]
    fn insecure_client_builds() {
        let opts = HttpClientOptions {
            insecure: true,
            timeout: Duration::from_secs(5),
            ..HttpClientOptions::default()
        };
        build_http_client(&opts).unwrap();
    }

    #[test]
    fn missing_ca_bundle_fails() {
        let opts = HttpClientOptions {
            ca_cert: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..HttpClientOptions::default()
        };
        let err = build_http_client(&opts).unwrap_err();
        assert!(matches!(err, TlsError::FileRead { .. }));
    }

    #[test]
    fn client_identity_without_key_fails() {
        let cert = pem_file("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n");
        let key = pem_file("no key here\n");
        let opts = HttpClientOptions {
            client_cert: Some(cert.path().to_path_buf()),
            client_key: Some(key.path().to_path_buf()),
            ..HttpClientOptions::default()
        };
        let err = build_http_client(&opts).unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey(_)));
    }
}
