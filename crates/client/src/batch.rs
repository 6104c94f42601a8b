//! Concurrent batch processing with per-entry retry and JSONL result logs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use secure_invoke_core::{BatchRequestEntry, BatchResult, BatchResultEntry};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, instrument, warn};

use crate::client::SecureInvokeClient;
use crate::error::Error;

pub const SUCCESS_LOG: &str = "success_log.jsonl";
pub const FAILURE_LOG: &str = "failure_log.jsonl";

/// Runs many requests through one [`SecureInvokeClient`].
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    client: Arc<SecureInvokeClient>,
    max_concurrent: usize,
    attempts: u32,
    retry_delay: Duration,
}

impl BatchProcessor {
    /// Take concurrency and retry settings from the client's configuration.
    pub fn new(client: Arc<SecureInvokeClient>) -> Self {
        let config = client.config();
        let max_concurrent = config.max_concurrent_requests.max(1);
        let attempts = config.retries.max(1);
        let retry_delay = config.retry_delay();
        Self {
            client,
            max_concurrent,
            attempts,
            retry_delay,
        }
    }

    pub fn client(&self) -> &Arc<SecureInvokeClient> {
        &self.client
    }

    /// Process `entries` with at most `max_concurrent_requests` in flight.
    ///
    /// Failed entries are recorded, never raised. Results are in completion
    /// order.
    #[instrument(skip_all, fields(entries = entries.len(), concurrency = self.max_concurrent))]
    pub async fn process_batch(&self, entries: Vec<BatchRequestEntry>) -> BatchResult {
        let started = Instant::now();

        let results: Vec<BatchResultEntry> = futures::stream::iter(entries)
            .map(|entry| {
                let this = self.clone();
                let id = entry.id;
                async move {
                    match tokio::spawn(async move { this.process_entry(entry).await }).await {
                        Ok(result) => result,
                        Err(e) => BatchResultEntry::failure(id, 1, format!("task failed: {e}")),
                    }
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let result = BatchResult::from_results(results);
        info!(
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            elapsed_ms = started.elapsed().as_millis(),
            "batch complete"
        );
        result
    }

    /// Run one entry to completion, retrying known failures.
    async fn process_entry(&self, entry: BatchRequestEntry) -> BatchResultEntry {
        let BatchRequestEntry { id, request } = entry;
        let request = serde_json::Value::Object(request);
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.client.get_bids(request.clone(), false).await {
                Ok(response) => {
                    debug!(id, attempt, "entry succeeded");
                    return BatchResultEntry::success(id, attempt, response);
                }
                Err(e) if e.is_retryable() => {
                    warn!(id, attempt, max = self.attempts, error = %e, "entry attempt failed");
                    last_error = e.to_string();
                }
                Err(e) => {
                    warn!(id, attempt, error = %e, "entry failed with non-retryable error");
                    return BatchResultEntry::failure(id, attempt, e.to_string());
                }
            }
        }

        BatchResultEntry::failure(id, self.attempts, last_error)
    }

    /// Process plain request objects, numbering them from 0 in input order.
    /// No logs are written.
    pub async fn process_batch_list(&self, requests: Vec<serde_json::Value>) -> Result<BatchResult, Error> {
        let entries = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| {
                let serde_json::Value::Object(request) = request else {
                    return Err(Error::Validation(format!(
                        "batch request {index} is not a JSON object"
                    )));
                };
                let id = i64::try_from(index)
                    .map_err(|_| Error::Validation("batch too large".into()))?;
                Ok(BatchRequestEntry::new(id, request))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.process_batch(entries).await)
    }

    /// Read a JSONL batch file, process it, and write result logs.
    ///
    /// Logs go to `output_dir`, or next to the batch file when `None`. The
    /// directory is created if missing.
    pub async fn process_batch_file(
        &self,
        path: impl AsRef<Path>,
        output_dir: Option<&Path>,
    ) -> Result<BatchResult, Error> {
        let path = path.as_ref();
        let entries = read_batch_file(path).await?;
        info!(path = %path.display(), entries = entries.len(), "loaded batch file");

        let output_dir = output_dir.map_or_else(
            || path.parent().map(Path::to_path_buf).unwrap_or_default(),
            Path::to_path_buf,
        );

        let result = self.process_batch(entries).await;
        write_logs(&result, &output_dir).await?;
        info!(
            success_rate = %format!("{:.1}%", result.success_rate()),
            output_dir = %output_dir.display(),
            "batch logs written"
        );
        Ok(result)
    }
}

/// Parse a JSONL batch file. Blank lines are ignored; lines that are not
/// UTF-8 or not a valid entry are skipped with a warning.
pub async fn read_batch_file(path: impl AsRef<Path>) -> Result<Vec<BatchRequestEntry>, Error> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_no += 1;
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping non-UTF-8 batch line");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<BatchRequestEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = line_no, error = %e, "skipping invalid batch line"),
        }
    }
    Ok(entries)
}

/// Write `success_log.jsonl` and `failure_log.jsonl` into `dir`, replacing
/// any previous logs.
pub async fn write_logs(result: &BatchResult, dir: &Path) -> Result<(PathBuf, PathBuf), Error> {
    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let success_path = dir.join(SUCCESS_LOG);
    let failure_path = dir.join(FAILURE_LOG);

    write_jsonl(&success_path, result.success_records()).await?;
    write_jsonl(&failure_path, result.failure_records()).await?;
    Ok((success_path, failure_path))
}

async fn write_jsonl<T: Serialize>(
    path: &Path,
    records: impl Iterator<Item = T>,
) -> Result<(), Error> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, &record)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        out.push(b'\n');
    }

    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}
