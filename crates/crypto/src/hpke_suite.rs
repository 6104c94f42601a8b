use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use hpke::{Deserializable, Kem as _, OpModeS, Serializable};
use rand_core::OsRng;
use secure_invoke_core::PublicKey;
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::CryptoError;

pub(crate) type SuiteKem = hpke::kem::X25519HkdfSha256;
pub(crate) type SuiteKdf = hpke::kdf::HkdfSha256;
pub(crate) type SuiteAead = hpke::aead::AesGcm256;

/// Exporter label the gateway uses to derive the response key.
pub const RESPONSE_SECRET_LABEL: &[u8] = b"response_secret";

/// Length of the exported response secret (an AES-256 key).
pub const SECRET_LEN: usize = 32;

/// Length of the X25519 encapsulated key that prefixes every request.
pub const ENCAPSULATED_KEY_LEN: usize = 32;

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Smallest well-formed response: a nonce and an empty sealed body.
pub const MIN_RESPONSE_LEN: usize = NONCE_LEN + TAG_LEN;

// The gateway expects empty HPKE info and empty associated data on both legs.
pub(crate) const REQUEST_INFO: &[u8] = b"";
pub(crate) const REQUEST_AAD: &[u8] = b"";

const LEGACY_AEAD_KEY_INFO: &[u8] = b"aead_key";

/// The per-request secret exported from the HPKE sender context.
///
/// Zeroized on drop and redacted in `Debug`. It lives only as long as the
/// request/response exchange it was derived for.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ResponseSecret([u8; SECRET_LEN]);

impl ResponseSecret {
    pub(crate) fn zeroed() -> Self {
        Self([0u8; SECRET_LEN])
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; SECRET_LEN] {
        &mut self.0
    }

    /// Raw secret bytes, for [`decrypt_response`].
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for ResponseSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseSecret([REDACTED])")
    }
}

/// Output of [`encrypt_request`].
#[derive(Debug)]
pub struct EncryptionResult {
    /// Encapsulated key followed by the sealed request.
    pub ciphertext: Vec<u8>,
    /// Secret for decrypting the matching response.
    pub secret: ResponseSecret,
}

impl EncryptionResult {
    pub fn into_parts(self) -> (Vec<u8>, ResponseSecret) {
        (self.ciphertext, self.secret)
    }
}

/// Seal `plaintext` to the gateway's public key.
///
/// A fresh ephemeral X25519 keypair is generated for every call, so no two
/// requests share key material. The returned ciphertext is the 32-byte
/// encapsulated key followed by the AES-256-GCM sealed request; the secret
/// is exported from the same sender context.
pub fn encrypt_request(
    plaintext: &[u8],
    public_key: &PublicKey,
) -> Result<EncryptionResult, CryptoError> {
    debug!(
        len = plaintext.len(),
        key_id = public_key.id(),
        "encrypting request"
    );

    let recipient = <SuiteKem as hpke::Kem>::PublicKey::from_bytes(public_key.key_bytes())
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    let (encapped, mut ctx) = hpke::setup_sender::<SuiteAead, SuiteKdf, SuiteKem, _>(
        &OpModeS::Base,
        &recipient,
        REQUEST_INFO,
        &mut OsRng,
    )
    .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let sealed = ctx
        .seal(plaintext, REQUEST_AAD)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut secret = ResponseSecret::zeroed();
    ctx.export(RESPONSE_SECRET_LABEL, secret.as_mut_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(format!("secret export: {e}")))?;

    let encapped = encapped.to_bytes();
    let mut ciphertext = Vec::with_capacity(encapped.len() + sealed.len());
    ciphertext.extend_from_slice(&encapped);
    ciphertext.extend_from_slice(&sealed);

    debug!(len = ciphertext.len(), "request encrypted");
    Ok(EncryptionResult { ciphertext, secret })
}

/// Decrypt a gateway response with the secret from [`encrypt_request`].
///
/// The first 32 bytes of `secret` are used directly as the AES-256-GCM key.
/// `ciphertext` is `nonce(12) || sealed data || tag(16)`. Length checks run
/// before any AEAD work, and an authentication failure never yields partial
/// plaintext.
pub fn decrypt_response(ciphertext: &[u8], secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
    debug!(len = ciphertext.len(), "decrypting response");

    if ciphertext.len() < MIN_RESPONSE_LEN {
        return Err(CryptoError::CiphertextTooShort {
            len: ciphertext.len(),
        });
    }
    if secret.len() < SECRET_LEN {
        return Err(CryptoError::SecretTooShort { len: secret.len() });
    }

    let cipher = Aes256Gcm::new_from_slice(&secret[..SECRET_LEN])
        .map_err(|_| CryptoError::SecretTooShort { len: secret.len() })?;
    let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    debug!(len = plaintext.len(), "response decrypted");
    Ok(plaintext)
}

/// HKDF-SHA256 expansion of a secret into an AES-256 key (info `"aead_key"`).
///
/// Not used on the response path: the gateway keys its response with the
/// raw exported secret. Kept for peers that expect the expanded form.
pub fn derive_aead_key(secret: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(LEGACY_AEAD_KEY_INFO, okm.as_mut())
        .map_err(|e| CryptoError::InvalidFormat(format!("HKDF expand: {e}")))?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::{RecipientKey, seal_response};

    #[test]
    fn roundtrip_through_responder() {
        let recipient = RecipientKey::generate("key-1");
        let plaintext = br#"{"buyerInput":{"interestGroups":[]},"publisherName":"x"}"#;

        let encrypted = encrypt_request(plaintext, recipient.public_key()).unwrap();
        let opened = recipient.open_request(&encrypted.ciphertext).unwrap();
        assert_eq!(opened.plaintext, plaintext);
        assert_eq!(opened.secret.as_bytes(), encrypted.secret.as_bytes());

        let response = br#"{"bids":[{"bid":1.5}]}"#;
        let sealed = seal_response(response, &opened.secret).unwrap();
        let decrypted = decrypt_response(&sealed, encrypted.secret.as_bytes()).unwrap();
        assert_eq!(decrypted, response);
    }

    #[test]
    fn ciphertext_is_prefixed_with_encapsulated_key() {
        let recipient = RecipientKey::generate("k");
        let encrypted = encrypt_request(b"hello", recipient.public_key()).unwrap();
        assert_eq!(
            encrypted.ciphertext.len(),
            ENCAPSULATED_KEY_LEN + b"hello".len() + TAG_LEN
        );
    }

    #[test]
    fn each_request_uses_a_fresh_ephemeral_key() {
        let recipient = RecipientKey::generate("k");
        let a = encrypt_request(b"same", recipient.public_key()).unwrap();
        let b = encrypt_request(b"same", recipient.public_key()).unwrap();
        assert_ne!(
            a.ciphertext[..ENCAPSULATED_KEY_LEN],
            b.ciphertext[..ENCAPSULATED_KEY_LEN]
        );
        assert_ne!(a.secret.as_bytes(), b.secret.as_bytes());
    }

    #[test]
    fn malformed_public_key_is_rejected() {
        let key = PublicKey::new("bad", vec![1u8; 31]);
        let err = encrypt_request(b"x", &key).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }

    #[test]
    fn short_ciphertext_is_rejected_before_decryption() {
        let err = decrypt_response(&[0u8; MIN_RESPONSE_LEN - 1], &[0u8; SECRET_LEN]).unwrap_err();
        assert!(matches!(err, CryptoError::CiphertextTooShort { len: 27 }));

        let err = decrypt_response(&[], &[0u8; SECRET_LEN]).unwrap_err();
        assert!(matches!(err, CryptoError::CiphertextTooShort { len: 0 }));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = decrypt_response(&[0u8; 64], &[0u8; 16]).unwrap_err();
        assert!(matches!(err, CryptoError::SecretTooShort { len: 16 }));
    }

    #[test]
    fn longer_secret_uses_first_32_bytes() {
        let recipient = RecipientKey::generate("k");
        let encrypted = encrypt_request(b"req", recipient.public_key()).unwrap();
        let opened = recipient.open_request(&encrypted.ciphertext).unwrap();
        let sealed = seal_response(b"resp", &opened.secret).unwrap();

        let mut long_secret = encrypted.secret.as_bytes().to_vec();
        long_secret.extend_from_slice(&[0xff; 16]);
        assert_eq!(decrypt_response(&sealed, &long_secret).unwrap(), b"resp");
    }

    #[test]
    fn tampered_tag_fails_authentication() {
        let recipient = RecipientKey::generate("k");
        let encrypted = encrypt_request(b"req", recipient.public_key()).unwrap();
        let opened = recipient.open_request(&encrypted.ciphertext).unwrap();
        let mut sealed = seal_response(b"response body", &opened.secret).unwrap();

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        let err = decrypt_response(&sealed, encrypted.secret.as_bytes()).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn wrong_secret_fails_authentication() {
        let recipient = RecipientKey::generate("k");
        let encrypted = encrypt_request(b"req", recipient.public_key()).unwrap();
        let opened = recipient.open_request(&encrypted.ciphertext).unwrap();
        let sealed = seal_response(b"response", &opened.secret).unwrap();

        let err = decrypt_response(&sealed, &[7u8; SECRET_LEN]).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn response_key_is_not_the_hkdf_expansion() {
        let recipient = RecipientKey::generate("k");
        let encrypted = encrypt_request(b"req", recipient.public_key()).unwrap();
        let opened = recipient.open_request(&encrypted.ciphertext).unwrap();
        let sealed = seal_response(b"response", &opened.secret).unwrap();

        let expanded = derive_aead_key(encrypted.secret.as_bytes()).unwrap();
        assert_ne!(expanded.as_ref(), encrypted.secret.as_bytes());
        assert!(decrypt_response(&sealed, expanded.as_ref()).is_err());
    }

    #[test]
    fn derive_aead_key_is_deterministic() {
        let a = derive_aead_key(&[3u8; 32]).unwrap();
        let b = derive_aead_key(&[3u8; 32]).unwrap();
        let c = derive_aead_key(&[4u8; 32]).unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
        assert_ne!(a.as_ref(), c.as_ref());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let recipient = RecipientKey::generate("k");
        let encrypted = encrypt_request(b"req", recipient.public_key()).unwrap();
        assert_eq!(
            format!("{:?}", encrypted.secret),
            "ResponseSecret([REDACTED])"
        );
    }
}
