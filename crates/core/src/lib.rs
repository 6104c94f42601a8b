//! Shared types for the secure-invoke client.
//!
//! This crate holds the validated [`SecureInvokeConfig`] record, the public
//! key model handed out by the KMS, the wire payload exchanged with the
//! gateway, and the batch request/result model.

pub mod batch;
pub mod config;
pub mod error;
pub mod key;
pub mod wire;

pub use batch::{BatchRequestEntry, BatchResult, BatchResultEntry, FailureLogRecord, SuccessLogRecord};
pub use config::SecureInvokeConfig;
pub use error::ConfigError;
pub use key::PublicKey;
pub use wire::{EncryptedRequest, PROTOCOL_VERSION};

/// Prefix `https://` to a host unless it already carries an HTTP scheme.
///
/// ```
/// use secure_invoke_core::with_https_scheme;
///
/// assert_eq!(with_https_scheme("kms.example.com"), "https://kms.example.com");
/// assert_eq!(with_https_scheme("http://127.0.0.1:8000"), "http://127.0.0.1:8000");
/// ```
#[must_use]
pub fn with_https_scheme(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    }
}
