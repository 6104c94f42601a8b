//! Secure Invoke Client
//!
//! Sends HPKE-encrypted requests to a bidding gateway and decrypts the
//! responses, one at a time or as a concurrent batch.
//!
//! # Quick Start
//!
//! ```no_run
//! use secure_invoke_client::SecureInvokeClient;
//! use secure_invoke_core::SecureInvokeConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), secure_invoke_client::Error> {
//!     let config = SecureInvokeConfig::new("kms.example.com", "bfe.example.com")
//!         .with_header("x-api-key", "secret");
//!     let client = SecureInvokeClient::new(config)?;
//!
//!     let request = serde_json::json!({
//!         "buyerInput": {"interestGroups": []},
//!         "publisherName": "example.com",
//!     });
//!     let response = client.get_bids(request, false).await?;
//!     println!("{response}");
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Batch mode
//!
//! ```no_run
//! use std::sync::Arc;
//! use secure_invoke_client::{BatchProcessor, SecureInvokeClient};
//! use secure_invoke_core::SecureInvokeConfig;
//!
//! # async fn run() -> Result<(), secure_invoke_client::Error> {
//! let config = SecureInvokeConfig::new("kms.example.com", "bfe.example.com")
//!     .with_max_concurrent_requests(5)
//!     .with_retries(3);
//! let processor = BatchProcessor::new(Arc::new(SecureInvokeClient::new(config)?));
//! let result = processor.process_batch_file("requests.jsonl", None).await?;
//! println!("{}/{} succeeded", result.successful, result.total);
//! # Ok(())
//! # }
//! ```

pub mod batch;
mod client;
mod error;
pub mod kms;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod mock_http;

pub use batch::{BatchProcessor, FAILURE_LOG, SUCCESS_LOG, read_batch_file, write_logs};
pub use client::{SecureInvokeClient, validate_request};
pub use error::Error;
pub use kms::{DEFAULT_KEY_TTL, HttpKeySource, KeyCache, KeySource};
pub use retry::RetryStrategy;
pub use transport::{HttpTransport, Transport};
