//! HTTPS delivery of encrypted payloads to the gateway.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use secure_invoke_crypto::tls::{HttpClientOptions, build_http_client};
use tracing::{debug, instrument, warn};

use crate::error::Error;
use crate::retry::RetryStrategy;

/// Statuses worth another attempt at the transport layer.
const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Sends a JSON payload and returns the JSON response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        payload: &serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error>;
}

/// `POST` over a pooled rustls client with bounded retry.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_retries: u32,
    backoff: RetryStrategy,
}

impl HttpTransport {
    /// Build the transport and its connection pool.
    pub fn new(
        options: &HttpClientOptions,
        max_retries: u32,
        backoff: RetryStrategy,
    ) -> Result<Self, Error> {
        let client = build_http_client(options)
            .map_err(|e| Error::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, max_retries, backoff))
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client, max_retries: u32, backoff: RetryStrategy) -> Self {
        Self {
            client,
            max_retries,
            backoff,
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.backoff.delay_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, payload, headers), fields(url = %url))]
    async fn send(
        &self,
        url: &str,
        payload: &serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let mut attempt: u32 = 0;

        loop {
            // Headers first: `json()` only sets Content-Type when absent.
            let mut request = self.client.post(url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let request = request.json(payload);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_connect() && attempt < self.max_retries => {
                    warn!(attempt, error = %e, "connection failed, retrying");
                    self.backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(e) if e.is_timeout() => {
                    return Err(Error::Request(format!("request timed out: {e}")));
                }
                Err(e) => return Err(Error::Request(format!("request failed: {e}"))),
            };

            let status = response.status();
            if RETRYABLE_STATUSES.contains(&status) && attempt < self.max_retries {
                warn!(attempt, %status, "retryable status from gateway");
                self.backoff(attempt).await;
                attempt += 1;
                continue;
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Request(format!("failed to read response body: {e}")))?;

            if !status.is_success() {
                return Err(Error::Request(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body)
                )));
            }

            debug!(%status, len = body.len(), attempts = attempt + 1, "gateway responded");
            return serde_json::from_slice(&body)
                .map_err(|e| Error::Request(format!("response is not valid JSON: {e}")));
        }
    }
}

/// Idle connections kept per host when `max_concurrent` requests run at once.
pub fn pool_size_for(max_concurrent: usize) -> usize {
    max_concurrent.saturating_mul(2).max(1)
}

/// Transport options derived from a validated configuration.
pub fn http_options(config: &secure_invoke_core::SecureInvokeConfig) -> HttpClientOptions {
    HttpClientOptions {
        client_cert: config.client_cert.clone(),
        client_key: config.client_key.clone(),
        ca_cert: config.ca_cert.clone(),
        insecure: config.insecure,
        timeout: config.timeout(),
        pool_max_idle_per_host: pool_size_for(config.max_concurrent_requests),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_http::MockServer;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn transport(max_retries: u32) -> HttpTransport {
        HttpTransport::with_client(
            reqwest::Client::new(),
            max_retries,
            RetryStrategy::Constant {
                delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn returns_json_body_and_sends_headers() {
        let gateway = MockServer::start(vec![("200 OK", r#"{"response_ciphertext":"AA=="}"#)]).await;
        let mut headers = HashMap::new();
        headers.insert("x-bna-client-ip".to_owned(), "10.0.0.1".to_owned());

        let body = transport(3)
            .send(&gateway.url, &serde_json::json!({"key_id": "k"}), &headers)
            .await
            .unwrap();
        assert_eq!(body["response_ciphertext"], "AA==");
        assert_eq!(gateway.hits(), 1);

        let raw = gateway.last_request().await.to_lowercase();
        assert!(raw.starts_with("post "));
        assert!(raw.contains("x-bna-client-ip: 10.0.0.1"));
        assert!(raw.contains("content-type: application/json"));
    }

    #[tokio::test]
    async fn retries_retryable_status_then_succeeds() {
        let gateway = MockServer::start(vec![
            ("503 Service Unavailable", "{}"),
            ("429 Too Many Requests", "{}"),
            ("200 OK", r#"{"ok":true}"#),
        ])
        .await;

        let body = transport(3)
            .send(&gateway.url, &serde_json::json!({}), &HashMap::new())
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(gateway.hits(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let gateway = MockServer::start(vec![("502 Bad Gateway", "upstream down")]).await;

        let err = transport(2)
            .send(&gateway.url, &serde_json::json!({}), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request(_)));
        assert!(err.to_string().contains("HTTP 502"));
        assert_eq!(gateway.hits(), 3);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let gateway = MockServer::start(vec![("400 Bad Request", "bad key_id")]).await;

        let err = transport(3)
            .send(&gateway.url, &serde_json::json!({}), &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request error: HTTP 400: bad key_id");
        assert_eq!(gateway.hits(), 1);
    }

    #[tokio::test]
    async fn non_json_body_is_a_request_error() {
        let gateway = MockServer::start(vec![("200 OK", "<html>oops</html>")]).await;

        let err = transport(0)
            .send(&gateway.url, &serde_json::json!({}), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request(_)));
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn connection_refused_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport(1)
            .send(&format!("http://{addr}"), &serde_json::json!({}), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }

    #[tokio::test]
    async fn silent_gateway_times_out_as_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let transport = HttpTransport::with_client(
            client,
            3,
            RetryStrategy::exponential(Duration::from_millis(1)),
        );

        let started = std::time::Instant::now();
        let err = transport
            .send(&format!("http://{addr}"), &serde_json::json!({}), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request(_)));
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
        hold.abort();
    }

    #[test]
    fn pool_is_twice_concurrency() {
        assert_eq!(pool_size_for(10), 20);
        assert_eq!(pool_size_for(0), 1);
    }
}
