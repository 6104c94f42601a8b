use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

/// A recipient public key published by the KMS.
///
/// Holds the decoded key material together with the identifier the gateway
/// uses to select its private key. Immutable once constructed.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    id: String,
    key_bytes: Vec<u8>,
}

impl PublicKey {
    /// Wrap already-decoded key material.
    pub fn new(id: impl Into<String>, key_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            key_bytes: key_bytes.into(),
        }
    }

    /// Decode the base64 key string returned by `/listpubkeys`.
    pub fn from_base64(id: impl Into<String>, encoded: &str) -> Result<Self, base64::DecodeError> {
        let key_bytes = B64.decode(encoded.trim())?;
        Ok(Self::new(id, key_bytes))
    }

    /// Key identifier sent to the gateway as `key_id`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw public key bytes.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    /// Base64 form of the key, as published by the KMS.
    pub fn to_base64(&self) -> String {
        B64.encode(&self.key_bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("id", &self.id)
            .field("len", &self.key_bytes.len())
            .finish()
    }
}
