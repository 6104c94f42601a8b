//! Public key retrieval from the KMS and the shared key cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secure_invoke_core::{PublicKey, with_https_scheme};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::error::Error;

/// How long a fetched key stays valid.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

const LIST_KEYS_PATH: &str = "/listpubkeys";

/// Where public keys come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the gateway's current public key.
    async fn fetch_key(&self) -> Result<PublicKey, Error>;
}

#[derive(Debug, Deserialize)]
struct KeyListResponse {
    #[serde(default)]
    keys: Vec<KeyListEntry>,
}

#[derive(Debug, Deserialize)]
struct KeyListEntry {
    key: Option<String>,
    id: Option<String>,
}

/// `GET <kms_host>/listpubkeys` over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    client: reqwest::Client,
    url: Url,
}

impl HttpKeySource {
    /// Build a key source for `kms_host`.
    ///
    /// `https://` is prefixed when the host has no scheme, and any path on
    /// the host is replaced by `/listpubkeys`. Certificate verification is
    /// skipped only when `insecure` is set.
    pub fn new(kms_host: &str, insecure: bool, timeout: Duration) -> Result<Self, Error> {
        let base = with_https_scheme(kms_host.trim().trim_end_matches('/'));
        let url = Url::parse(&base)
            .and_then(|u| u.join(LIST_KEYS_PATH))
            .map_err(|e| Error::Kms(format!("invalid KMS host {kms_host:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| Error::Kms(format!("failed to build KMS client: {e}")))?;

        Ok(Self { client, url })
    }

    /// The fully-qualified key listing URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_key(&self) -> Result<PublicKey, Error> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::Kms(format!("failed to reach KMS: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Kms(format!("KMS returned HTTP {status}: {body}")));
        }

        let listing: KeyListResponse = response
            .json()
            .await
            .map_err(|e| Error::Kms(format!("malformed KMS response: {e}")))?;

        parse_first_key(listing)
    }
}

fn parse_first_key(listing: KeyListResponse) -> Result<PublicKey, Error> {
    let first = listing
        .keys
        .into_iter()
        .next()
        .ok_or_else(|| Error::Kms("no keys returned from KMS".into()))?;

    let (Some(key), Some(id)) = (first.key, first.id) else {
        return Err(Error::Kms("KMS key entry is missing `key` or `id`".into()));
    };

    PublicKey::from_base64(id, &key)
        .map_err(|e| Error::Kms(format!("KMS key is not valid base64: {e}")))
}

#[derive(Debug, Clone)]
struct CachedKey {
    key: PublicKey,
    fetched_at: Instant,
}

/// Time-bounded cache over a [`KeySource`].
///
/// Readers of a valid key only take the read lock. Refreshes are serialized
/// behind a separate mutex; callers that queued behind a refresh receive
/// that refresh's key instead of issuing their own KMS call.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    ttl: Duration,
    entry: RwLock<Option<CachedKey>>,
    refresh: Mutex<()>,
    generation: AtomicU64,
}

impl KeyCache {
    /// A cache with the default one-hour TTL.
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self::with_ttl(source, DEFAULT_KEY_TTL)
    }

    pub fn with_ttl(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    async fn cached(&self) -> Option<PublicKey> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.key.clone())
    }

    /// Return the cached key, fetching a new one when the cache is empty,
    /// expired, or `force_refresh` is set.
    pub async fn fetch(&self, force_refresh: bool) -> Result<PublicKey, Error> {
        if !force_refresh {
            if let Some(key) = self.cached().await {
                return Ok(key);
            }
        }

        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.refresh.lock().await;

        // Someone else refreshed while we waited for the lock.
        let refreshed_elsewhere = self.generation.load(Ordering::Acquire) != observed;
        if refreshed_elsewhere || !force_refresh {
            if let Some(key) = self.cached().await {
                debug!("using key refreshed by a concurrent caller");
                return Ok(key);
            }
        }

        let key = self.source.fetch_key().await?;
        info!(key_id = key.id(), "fetched public key from KMS");

        *self.entry.write().await = Some(CachedKey {
            key: key.clone(),
            fetched_at: Instant::now(),
        });
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(key)
    }

    /// Drop the cached key so the next fetch goes to the KMS.
    pub async fn clear_cache(&self) {
        *self.entry.write().await = None;
        debug!("key cache cleared");
    }

    /// Whether a non-expired key is cached.
    pub async fn is_valid(&self) -> bool {
        self.cached().await.is_some()
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("ttl", &self.ttl)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
