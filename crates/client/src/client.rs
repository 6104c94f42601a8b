use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use secure_invoke_core::{EncryptedRequest, SecureInvokeConfig, with_https_scheme};
use secure_invoke_crypto::{decrypt_response, encrypt_request};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::error::Error;
use crate::kms::{HttpKeySource, KeyCache, KeySource};
use crate::retry::RetryStrategy;
use crate::transport::{HttpTransport, Transport, http_options};

/// Sends one encrypted request to the gateway and decrypts the reply.
///
/// Owns the key cache and transport. Share across tasks with
/// `Arc<SecureInvokeClient>`.
pub struct SecureInvokeClient {
    config: Arc<SecureInvokeConfig>,
    keys: KeyCache,
    transport: Arc<dyn Transport>,
    gateway_url: String,
}

impl SecureInvokeClient {
    /// Validate `config` and build the KMS and gateway HTTP clients.
    pub fn new(config: SecureInvokeConfig) -> Result<Self, Error> {
        let config = config.validate()?;

        let keys: Arc<dyn KeySource> = Arc::new(HttpKeySource::new(
            &config.kms_host,
            config.insecure,
            config.timeout(),
        )?);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            &http_options(&config),
            config.retries,
            RetryStrategy::exponential(config.retry_delay()),
        )?);

        info!(
            kms = %config.kms_host,
            gateway = %config.buyer_host,
            service = %config.target_service,
            "secure invoke client ready"
        );
        Ok(Self::from_parts(config, keys, transport))
    }

    /// Validate `config` and use the given key source and transport.
    pub fn with_components(
        config: SecureInvokeConfig,
        keys: Arc<dyn KeySource>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Error> {
        Ok(Self::from_parts(config.validate()?, keys, transport))
    }

    fn from_parts(
        config: SecureInvokeConfig,
        keys: Arc<dyn KeySource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let gateway_url = with_https_scheme(&config.buyer_host);
        Self {
            config: Arc::new(config),
            keys: KeyCache::new(keys),
            transport,
            gateway_url,
        }
    }

    pub fn config(&self) -> &SecureInvokeConfig {
        &self.config
    }

    /// The shared key cache.
    pub fn key_cache(&self) -> &KeyCache {
        &self.keys
    }

    /// Encrypt `request`, send it to the gateway, and return the decrypted
    /// JSON response.
    ///
    /// Validation runs before any network call. The response secret lives
    /// only for the duration of this call.
    #[instrument(skip(self, request), fields(service = %self.config.target_service))]
    pub async fn get_bids(&self, request: Value, refresh_key: bool) -> Result<Value, Error> {
        let request = validate_request(request)?;

        let key = self.keys.fetch(refresh_key).await?;
        let plaintext = serde_json::to_vec(&request)
            .map_err(|e| Error::Validation(format!("request is not serializable: {e}")))?;

        let (ciphertext, secret) = encrypt_request(&plaintext, &key)?.into_parts();
        let body = EncryptedRequest::new(B64.encode(&ciphertext), key.id());
        let body = serde_json::to_value(&body)
            .map_err(|e| Error::Request(format!("failed to encode payload: {e}")))?;

        debug!(key_id = key.id(), len = ciphertext.len(), "sending encrypted request");
        if self.config.verbose {
            let fields: Vec<&str> = request.keys().map(String::as_str).collect();
            debug!(?fields, "request payload fields");
        }
        let response = self
            .transport
            .send(&self.gateway_url, &body, &self.request_headers())
            .await?;

        if self.config.verbose {
            let fields: Vec<&str> = response
                .as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default();
            debug!(?fields, "gateway response fields");
        }
        let sealed = extract_response_ciphertext(&response)?;
        let plaintext = decrypt_response(&sealed, secret.as_bytes())?;
        drop(secret);

        serde_json::from_slice(&plaintext).map_err(|e| {
            Error::Crypto(secure_invoke_crypto::CryptoError::InvalidFormat(format!(
                "decrypted response is not JSON: {e}"
            )))
        })
    }

    /// Default headers overlaid with the configured custom headers.
    ///
    /// Names are lowercased so a custom header replaces its default
    /// regardless of spelling.
    fn request_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::from([
            ("content-type".to_owned(), "application/json".to_owned()),
            ("x-bna-client-ip".to_owned(), self.config.client_ip.clone()),
            ("x-user-agent".to_owned(), self.config.client_user_agent.clone()),
            (
                "x-accept-language".to_owned(),
                self.config.client_accept_language.clone(),
            ),
        ]);
        for (name, value) in &self.config.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        if self.config.verbose {
            let mut names: Vec<&str> = headers.keys().map(String::as_str).collect();
            names.sort_unstable();
            debug!(url = %self.gateway_url, headers = ?names, "request headers");
        }
        headers
    }

    /// Clear the key cache and release the client.
    pub async fn close(self) {
        self.keys.clear_cache().await;
        debug!("secure invoke client closed");
    }
}

impl std::fmt::Debug for SecureInvokeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureInvokeClient")
            .field("gateway_url", &self.gateway_url)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// Check the request shape and normalize `clientType` to `client_type`.
pub fn validate_request(request: Value) -> Result<Map<String, Value>, Error> {
    let Value::Object(mut request) = request else {
        return Err(Error::Validation("request must be a JSON object".into()));
    };

    let buyer_input = request
        .get("buyerInput")
        .ok_or_else(|| Error::Validation("missing required field: buyerInput".into()))?;
    if !request.contains_key("publisherName") {
        return Err(Error::Validation(
            "missing required field: publisherName".into(),
        ));
    }
    let has_groups = buyer_input
        .as_object()
        .is_some_and(|b| b.contains_key("interestGroups"));
    if !has_groups {
        return Err(Error::Validation(
            "buyerInput must contain interestGroups".into(),
        ));
    }

    if let Some(client_type) = request.remove("clientType") {
        request.insert("client_type".to_owned(), client_type);
    }
    Ok(request)
}

fn extract_response_ciphertext(response: &Value) -> Result<Vec<u8>, Error> {
    use secure_invoke_crypto::CryptoError;

    let encoded = response
        .get("response_ciphertext")
        .or_else(|| response.get("responseCiphertext"))
        .ok_or_else(|| {
            CryptoError::InvalidFormat("response has no response_ciphertext".into())
        })?
        .as_str()
        .ok_or_else(|| CryptoError::InvalidFormat("response_ciphertext is not a string".into()))?;

    B64.decode(encoded)
        .map_err(|e| CryptoError::InvalidFormat(format!("response_ciphertext is not base64: {e}")).into())
}
