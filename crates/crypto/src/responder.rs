//! The gateway side of the exchange.
//!
//! Opens HPKE-sealed requests and seals responses with the exported secret.
//! Used by test gateways and local tooling that stand in for a real bidding
//! service.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadRng};
use aes_gcm::Aes256Gcm;
use hpke::{Deserializable, Kem as _, OpModeR, Serializable};
use rand_core::OsRng;
use secure_invoke_core::PublicKey;

use crate::CryptoError;
use crate::hpke_suite::{
    ENCAPSULATED_KEY_LEN, REQUEST_AAD, REQUEST_INFO, RESPONSE_SECRET_LABEL, ResponseSecret,
    SuiteAead, SuiteKdf, SuiteKem,
};

/// An X25519 keypair a gateway would publish through the KMS.
pub struct RecipientKey {
    private: <SuiteKem as hpke::Kem>::PrivateKey,
    public: PublicKey,
}

impl RecipientKey {
    /// Generate a fresh keypair, publishing the public half under `id`.
    pub fn generate(id: impl Into<String>) -> Self {
        let (private, public) = SuiteKem::gen_keypair(&mut OsRng);
        let public = PublicKey::new(id, public.to_bytes().to_vec());
        Self { private, public }
    }

    /// The public half, as it would appear in a KMS key listing.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Open a request produced by [`encrypt_request`](crate::encrypt_request).
    pub fn open_request(&self, payload: &[u8]) -> Result<OpenedRequest, CryptoError> {
        if payload.len() < ENCAPSULATED_KEY_LEN {
            return Err(CryptoError::CiphertextTooShort { len: payload.len() });
        }
        let (encapped, sealed) = payload.split_at(ENCAPSULATED_KEY_LEN);
        let encapped = <SuiteKem as hpke::Kem>::EncappedKey::from_bytes(encapped)
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;

        let mut ctx = hpke::setup_receiver::<SuiteAead, SuiteKdf, SuiteKem>(
            &OpModeR::Base,
            &self.private,
            &encapped,
            REQUEST_INFO,
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

        let plaintext = ctx
            .open(sealed, REQUEST_AAD)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let mut secret = ResponseSecret::zeroed();
        ctx.export(RESPONSE_SECRET_LABEL, secret.as_mut_bytes())
            .map_err(|e| CryptoError::InvalidFormat(format!("secret export: {e}")))?;

        Ok(OpenedRequest { plaintext, secret })
    }
}

impl fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipientKey")
            .field("id", &self.public.id())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// A decrypted request and the secret for answering it.
#[derive(Debug)]
pub struct OpenedRequest {
    pub plaintext: Vec<u8>,
    pub secret: ResponseSecret,
}

/// Seal a response as `nonce(12) || ciphertext || tag(16)` under the raw
/// response secret.
pub fn seal_response(plaintext: &[u8], secret: &ResponseSecret) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(secret.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(&mut AeadRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(nonce.len() + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MIN_RESPONSE_LEN, encrypt_request};

    #[test]
    fn public_key_is_32_bytes() {
        let key = RecipientKey::generate("abc");
        assert_eq!(key.public_key().id(), "abc");
        assert_eq!(key.public_key().key_bytes().len(), 32);
    }

    #[test]
    fn request_for_another_key_does_not_open() {
        let intended = RecipientKey::generate("a");
        let other = RecipientKey::generate("b");
        let encrypted = encrypt_request(b"secret bid", intended.public_key()).unwrap();
        let err = other.open_request(&encrypted.ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn truncated_request_is_rejected() {
        let key = RecipientKey::generate("a");
        let err = key.open_request(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CryptoError::CiphertextTooShort { len: 10 }));
    }

    #[test]
    fn empty_response_has_minimum_length() {
        let key = RecipientKey::generate("a");
        let encrypted = encrypt_request(b"x", key.public_key()).unwrap();
        let opened = key.open_request(&encrypted.ciphertext).unwrap();
        let sealed = seal_response(b"", &opened.secret).unwrap();
        assert_eq!(sealed.len(), MIN_RESPONSE_LEN);
    }

    #[test]
    fn debug_hides_private_key() {
        let key = RecipientKey::generate("kid");
        let rendered = format!("{key:?}");
        assert!(rendered.contains("kid"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
