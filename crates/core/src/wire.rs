use serde::{Deserialize, Serialize};

/// Protocol version sent with every encrypted request.
pub const PROTOCOL_VERSION: &str = "1.0";

/// JSON body POSTed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRequest {
    /// Base64 of the encapsulated key followed by the HPKE ciphertext.
    pub request_ciphertext: String,
    /// Identifier of the KMS key the request was encrypted to.
    pub key_id: String,
    /// Always [`PROTOCOL_VERSION`].
    pub version: String,
}

impl EncryptedRequest {
    /// Build a request body for the current protocol version.
    pub fn new(request_ciphertext: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            request_ciphertext: request_ciphertext.into(),
            key_id: key_id.into(),
            version: PROTOCOL_VERSION.to_owned(),
        }
    }
}
