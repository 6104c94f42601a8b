use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a [`SecureInvokeConfig`](crate::SecureInvokeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required host was empty or whitespace.
    #[error("{field} cannot be empty")]
    EmptyHost { field: &'static str },

    /// Only one half of the mTLS identity was supplied.
    #[error("both client_cert and client_key must be provided or neither")]
    IncompleteClientIdentity,

    /// A certificate path does not exist.
    #[error("certificate file not found: {}", path.display())]
    CertificateNotFound { path: PathBuf },

    /// A certificate path exists but is not a regular file.
    #[error("path is not a file: {}", path.display())]
    NotAFile { path: PathBuf },

    /// A numeric option is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },

    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
