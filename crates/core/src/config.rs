use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration for a secure-invoke client, loadable from TOML.
///
/// Every field except the two hosts has a default, so a minimal file only
/// needs `kms_host` and `buyer_host`:
///
/// ```toml
/// kms_host = "kms.example.com"
/// buyer_host = "gateway.example.com/v1/getbids"
/// retries = 5
///
/// [headers]
/// x-api-key = "..."
/// ```
///
/// A config must pass [`SecureInvokeConfig::validate`] before a client will
/// accept it; the validated record is never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct SecureInvokeConfig {
    /// Host (and optional port) of the key management service.
    #[serde(default)]
    pub kms_host: String,
    /// Gateway host and endpoint that receives encrypted requests.
    #[serde(default)]
    pub buyer_host: String,
    /// Target backend service behind the gateway (`bfe` or `sfe`).
    #[serde(default = "default_target_service")]
    pub target_service: String,
    /// Extra HTTP headers sent with every gateway request (API keys etc.).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// PEM client certificate for mTLS.
    pub client_cert: Option<PathBuf>,
    /// PEM private key matching `client_cert`.
    pub client_key: Option<PathBuf>,
    /// PEM CA bundle trusted in addition to the system roots.
    pub ca_cert: Option<PathBuf>,
    /// Skip TLS certificate verification. Development only.
    #[serde(default)]
    pub insecure: bool,
    /// Attempts per batch entry, also the transport retry budget.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on in-flight requests in batch mode.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Log per-request details such as the gateway URL and header names at
    /// debug level.
    #[serde(default)]
    pub verbose: bool,
    /// Value of the `x-bna-client-ip` header.
    #[serde(default = "default_client_ip")]
    pub client_ip: String,
    /// Value of the `x-user-agent` header.
    #[serde(default = "default_client_user_agent")]
    pub client_user_agent: String,
    /// Value of the `x-accept-language` header.
    #[serde(default = "default_client_accept_language")]
    pub client_accept_language: String,
}

fn default_target_service() -> String {
    "bfe".to_owned()
}

fn default_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_client_ip() -> String {
    "127.0.0.1".to_owned()
}

fn default_client_user_agent() -> String {
    concat!("SecureInvokeRust/", env!("CARGO_PKG_VERSION")).to_owned()
}

fn default_client_accept_language() -> String {
    "en-US,en;q=0.9".to_owned()
}

impl SecureInvokeConfig {
    /// Create a configuration with default settings for the given hosts.
    pub fn new(kms_host: impl Into<String>, buyer_host: impl Into<String>) -> Self {
        Self {
            kms_host: kms_host.into(),
            buyer_host: buyer_host.into(),
            target_service: default_target_service(),
            headers: HashMap::new(),
            client_cert: None,
            client_key: None,
            ca_cert: None,
            insecure: false,
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
            retry_delay_ms: default_retry_delay_ms(),
            verbose: false,
            client_ip: default_client_ip(),
            client_user_agent: default_client_user_agent(),
            client_accept_language: default_client_accept_language(),
        }
    }

    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Set the target backend service.
    #[must_use]
    pub fn with_target_service(mut self, target_service: impl Into<String>) -> Self {
        self.target_service = target_service.into();
        self
    }

    /// Add a custom header sent with every gateway request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Use a client certificate and key for mutual TLS.
    #[must_use]
    pub fn with_client_identity(
        mut self,
        client_cert: impl Into<PathBuf>,
        client_key: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(client_cert.into());
        self.client_key = Some(client_key.into());
        self
    }

    /// Trust an additional CA bundle.
    #[must_use]
    pub fn with_ca_cert(mut self, ca_cert: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(ca_cert.into());
        self
    }

    /// Disable TLS certificate verification.
    #[must_use]
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the per-request timeout (whole seconds).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Set the batch concurrency limit.
    #[must_use]
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    /// Set the delay between retries.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable verbose request logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Override the client metadata headers.
    #[must_use]
    pub fn with_client_metadata(
        mut self,
        ip: impl Into<String>,
        user_agent: impl Into<String>,
        accept_language: impl Into<String>,
    ) -> Self {
        self.client_ip = ip.into();
        self.client_user_agent = user_agent.into();
        self.client_accept_language = accept_language.into();
        self
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between retries.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Check the configuration invariants and return the normalized record.
    ///
    /// Hosts are trimmed, certificate paths are canonicalized and must point
    /// at regular files, and the mTLS certificate and key must be supplied
    /// together.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.kms_host = non_empty_host(&self.kms_host, "kms_host")?;
        self.buyer_host = non_empty_host(&self.buyer_host, "buyer_host")?;

        if self.timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "timeout_secs",
                reason: "must be greater than zero",
            });
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrent_requests",
                reason: "must be at least 1",
            });
        }

        self.client_cert = self.client_cert.as_deref().map(resolve_file).transpose()?;
        self.client_key = self.client_key.as_deref().map(resolve_file).transpose()?;
        self.ca_cert = self.ca_cert.as_deref().map(resolve_file).transpose()?;

        if self.client_cert.is_some() != self.client_key.is_some() {
            return Err(ConfigError::IncompleteClientIdentity);
        }

        Ok(self)
    }
}

fn non_empty_host(host: &str, field: &'static str) -> Result<String, ConfigError> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyHost { field });
    }
    Ok(trimmed.to_owned())
}

fn resolve_file(path: &Path) -> Result<PathBuf, ConfigError> {
    let resolved = std::fs::canonicalize(path).map_err(|_| ConfigError::CertificateNotFound {
        path: path.to_path_buf(),
    })?;
    if !resolved.is_file() {
        return Err(ConfigError::NotAFile { path: resolved });
    }
    Ok(resolved)
}
