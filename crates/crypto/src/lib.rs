//! Cryptography for the secure-invoke request/response exchange.
//!
//! Requests are sealed to the gateway's KMS-published X25519 key with HPKE
//! (DHKEM(X25519, HKDF-SHA256), HKDF-SHA256, AES-256-GCM). The sender context
//! also exports a 32-byte [`ResponseSecret`] under the label
//! `"response_secret"`; the gateway derives the same secret and uses it
//! directly as the AES-256-GCM key for its response, framed as
//! `nonce(12) || ciphertext || tag(16)`.
//!
//! The [`responder`] module implements the gateway side of that exchange and
//! the [`framing`] module the optional gzip + length-prefix layer. With the
//! `tls` feature, [`tls`] builds the pooled HTTPS client used for transport.

pub mod framing;
mod hpke_suite;
pub mod responder;
#[cfg(feature = "tls")]
pub mod tls;

use thiserror::Error;

pub use framing::{decode_framed_payload, encode_framed_payload};
pub use hpke_suite::{
    ENCAPSULATED_KEY_LEN, EncryptionResult, MIN_RESPONSE_LEN, NONCE_LEN,
    RESPONSE_SECRET_LABEL, ResponseSecret, SECRET_LEN, TAG_LEN, decrypt_response,
    derive_aead_key, encrypt_request,
};

/// Errors that can occur during encryption, decryption, or framing.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The KMS key could not be used as an X25519 HPKE public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// HPKE setup, sealing, or secret export failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// A response shorter than nonce + tag.
    #[error("ciphertext too short: {len} bytes")]
    CiphertextTooShort { len: usize },

    /// A response secret shorter than an AES-256 key.
    #[error("secret too short: {len} bytes, need at least {SECRET_LEN}")]
    SecretTooShort { len: usize },

    /// Authentication failed: wrong secret, tampered tag, or corrupted data.
    #[error("decryption failed (wrong secret or corrupted data)")]
    DecryptionFailed,

    /// A payload or envelope is structurally malformed.
    #[error("invalid payload: {0}")]
    InvalidFormat(String),

    /// gzip compression or decompression failed.
    #[error("compression failed: {0}")]
    Compression(String),
}
