use secure_invoke_core::ConfigError;
use secure_invoke_crypto::CryptoError;
use thiserror::Error;

/// Errors surfaced by the secure-invoke client.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The request object failed validation before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// Fetching or decoding a KMS key failed.
    #[error("KMS error: {0}")]
    Kms(String),

    /// Encryption, decryption, or response envelope handling failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The gateway call failed: connection, timeout, or non-success status.
    #[error("request error: {0}")]
    Request(String),

    /// Reading a batch file or writing result logs failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure outside the request pipeline, such as a panicked task.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Whether a batch entry that failed with this error may be attempted
    /// again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unexpected(_) | Self::Io(_))
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::Kms(_) => "kms",
            Self::Crypto(_) => "crypto",
            Self::Request(_) => "request",
            Self::Io(_) => "io",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_are_retryable() {
        assert!(Error::Validation("bad".into()).is_retryable());
        assert!(Error::Kms("down".into()).is_retryable());
        assert!(Error::Crypto(CryptoError::DecryptionFailed).is_retryable());
        assert!(Error::Request("HTTP 400: nope".into()).is_retryable());
    }

    #[test]
    fn unexpected_and_io_are_not_retryable() {
        assert!(!Error::Unexpected("task panicked".into()).is_retryable());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!Error::Io(io).is_retryable());
    }

    #[test]
    fn display_includes_category() {
        let err = Error::Request("HTTP 503: busy".into());
        assert_eq!(err.to_string(), "request error: HTTP 503: busy");
        assert_eq!(err.kind(), "request");
    }
}
