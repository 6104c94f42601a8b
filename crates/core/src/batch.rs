use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of a batch input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequestEntry {
    /// Caller-assigned identifier echoed into the result logs.
    pub id: i64,
    /// The request object sent through the encrypted pipeline.
    pub request: serde_json::Map<String, serde_json::Value>,
}

impl BatchRequestEntry {
    /// Create an entry from an id and request object.
    pub fn new(id: i64, request: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { id, request }
    }
}

/// Outcome of processing one batch entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultEntry {
    /// Identifier of the originating [`BatchRequestEntry`].
    pub id: i64,
    /// Number of attempts made, at least 1.
    pub attempts: u32,
    /// Whether the entry ultimately succeeded.
    pub success: bool,
    /// Decrypted gateway response on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Message of the last error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the entry completed.
    pub timestamp: DateTime<Utc>,
}

impl BatchResultEntry {
    /// A successful result stamped with the current time.
    pub fn success(id: i64, attempts: u32, response: serde_json::Value) -> Self {
        Self {
            id,
            attempts,
            success: true,
            response: Some(response),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed result stamped with the current time.
    pub fn failure(id: i64, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            id,
            attempts,
            success: false,
            response: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Per-entry results in completion order.
    pub results: Vec<BatchResultEntry>,
}

impl BatchResult {
    /// Tally a list of entry results.
    pub fn from_results(results: Vec<BatchResultEntry>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }

    /// Percentage of successful entries, `0.0` for an empty batch.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }

    /// Success-log records, in result order.
    pub fn success_records(&self) -> impl Iterator<Item = SuccessLogRecord<'_>> {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| SuccessLogRecord {
                id: r.id,
                attempts: r.attempts,
                raw_json_response: r.response.as_ref(),
                timestamp: r.timestamp,
            })
    }

    /// Failure-log records, in result order.
    pub fn failure_records(&self) -> impl Iterator<Item = FailureLogRecord<'_>> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| FailureLogRecord {
                id: r.id,
                attempts: r.attempts,
                error: r.error.as_deref(),
                timestamp: r.timestamp,
            })
    }
}

/// A line of `success_log.jsonl`.
#[derive(Debug, Serialize)]
pub struct SuccessLogRecord<'a> {
    pub id: i64,
    pub attempts: u32,
    pub raw_json_response: Option<&'a serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A line of `failure_log.jsonl`.
#[derive(Debug, Serialize)]
pub struct FailureLogRecord<'a> {
    pub id: i64,
    pub attempts: u32,
    pub error: Option<&'a str>,
    pub timestamp: DateTime<Utc>,
}
