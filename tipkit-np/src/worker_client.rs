//! Processing worker HTTP client
//!
//! The coordinator's only view of the worker. In steady state a single
//! endpoint is used: `POST /process-batch`. Transport errors and 5xx
//! responses are retried with exponential backoff; per-item errors inside a
//! 200 response pass through untouched for the coordinator to record.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tipkit_common::api::{
    vector_dim_ok, BatchItem, BatchItemResult, ErrorResponse, ProcessBatchRequest,
    ProcessBatchResponse,
};

/// Base delay of the retry backoff schedule.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Deadline for readiness probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Worker client errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Transport failures and 5xx exhausted every attempt. The batch's tips
    /// are recorded `failed("batch_exhausted")`.
    #[error("Batch attempts exhausted after {attempts}: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The worker rejected the request outright (4xx). Not retried.
    #[error("Worker rejected batch: {0}")]
    Rejected(String),
}

/// One attempt's failure mode, before retry classification.
#[derive(Debug)]
enum AttemptError {
    /// Connect/send/read failure, 5xx, or a malformed 200 body
    Retryable(String),
    /// 4xx
    Terminal(String),
}

/// HTTP client for the processing worker.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
    max_attempts: u32,
}

impl WorkerClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        max_attempts: u32,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_attempts: max_attempts.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the worker's health endpoint with a short deadline.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .http
            .post(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!(error = %err, "Health probe failed");
                false
            }
        }
    }

    /// Process one batch, retrying transport errors and 5xx with
    /// exponential backoff (base 1 s, factor 2, jitter ±20%).
    pub async fn process_batch(
        &self,
        items: &[BatchItem],
    ) -> Result<ProcessBatchResponse, BatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.try_process_batch(items).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Terminal(message)) => {
                    tracing::error!(attempt, error = %message, "Worker rejected batch");
                    return Err(BatchError::Rejected(message));
                }
                Err(AttemptError::Retryable(message)) if attempt < self.max_attempts => {
                    let delay = backoff_delay(attempt, rand::thread_rng().gen_range(0.8..=1.2));
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Batch attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Retryable(message)) => {
                    tracing::error!(
                        attempts = attempt,
                        error = %message,
                        "Batch attempts exhausted"
                    );
                    return Err(BatchError::Exhausted {
                        attempts: attempt,
                        last_error: message,
                    });
                }
            }
        }
    }

    async fn try_process_batch(
        &self,
        items: &[BatchItem],
    ) -> Result<ProcessBatchResponse, AttemptError> {
        let url = format!("{}/process-batch", self.base_url);
        let request = ProcessBatchRequest {
            items: items.to_vec(),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(format!("transport: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            let detail = read_error_body(response).await;
            return Err(AttemptError::Retryable(format!("worker 5xx ({status}): {detail}")));
        }
        if !status.is_success() {
            let detail = read_error_body(response).await;
            return Err(AttemptError::Terminal(format!("worker {status}: {detail}")));
        }

        let body: ProcessBatchResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Retryable(format!("malformed response body: {e}")))?;

        validate_response(items, &body).map_err(AttemptError::Retryable)?;
        Ok(body)
    }
}

/// Batch order preservation and dimensionality, checked before the
/// coordinator trusts a response.
fn validate_response(
    items: &[BatchItem],
    response: &ProcessBatchResponse,
) -> Result<(), String> {
    if response.results.len() != items.len() {
        return Err(format!(
            "result count {} does not match item count {}",
            response.results.len(),
            items.len()
        ));
    }

    for (item, result) in items.iter().zip(&response.results) {
        if result.id() != item.id {
            return Err(format!(
                "result order violated: expected id {}, got {}",
                item.id,
                result.id()
            ));
        }
        if let BatchItemResult::Ok(processed) = result {
            if !vector_dim_ok(&processed.vector) {
                return Err(format!(
                    "item {}: embedding has {} dimensions",
                    processed.id,
                    processed.vector.len()
                ));
            }
        }
    }
    Ok(())
}

async fn read_error_body(response: reqwest::Response) -> String {
    match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => "<unreadable body>".to_string(),
    }
}

/// Backoff delay for the given 1-based attempt: `base * 2^(attempt-1)`,
/// scaled by a jitter factor the caller draws from `[0.8, 1.2]`.
fn backoff_delay(attempt: u32, jitter: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = BACKOFF_BASE.as_secs_f64() * f64::from(1u32 << exponent);
    Duration::from_secs_f64(base * jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipkit_common::api::ProcessedItem;
    use tipkit_common::EMBEDDING_DIM;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1, 1.0), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, 1.0), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, 1.0), Duration::from_secs(4));
        assert_eq!(backoff_delay(4, 1.0), Duration::from_secs(8));
    }

    #[test]
    fn backoff_jitter_stays_within_twenty_percent() {
        let low = backoff_delay(2, 0.8);
        let high = backoff_delay(2, 1.2);
        assert_eq!(low, Duration::from_secs_f64(1.6));
        assert_eq!(high, Duration::from_secs_f64(2.4));
    }

    fn item(id: i64) -> BatchItem {
        BatchItem {
            id,
            text: format!("tip {id}"),
            source_language: None,
        }
    }

    fn ok_result(id: i64) -> BatchItemResult {
        BatchItemResult::Ok(ProcessedItem {
            id,
            detected_language: "en".to_string(),
            translated_text: format!("tip {id}"),
            vector: vec![0.1; EMBEDDING_DIM],
        })
    }

    #[test]
    fn validation_accepts_matching_response() {
        let items = vec![item(1), item(2)];
        let response = ProcessBatchResponse {
            results: vec![ok_result(1), ok_result(2)],
        };
        assert!(validate_response(&items, &response).is_ok());
    }

    #[test]
    fn validation_rejects_count_mismatch() {
        let items = vec![item(1), item(2)];
        let response = ProcessBatchResponse {
            results: vec![ok_result(1)],
        };
        assert!(validate_response(&items, &response).is_err());
    }

    #[test]
    fn validation_rejects_reordered_results() {
        let items = vec![item(1), item(2)];
        let response = ProcessBatchResponse {
            results: vec![ok_result(2), ok_result(1)],
        };
        assert!(validate_response(&items, &response).is_err());
    }

    #[test]
    fn validation_rejects_wrong_dimensionality() {
        let items = vec![item(1)];
        let response = ProcessBatchResponse {
            results: vec![BatchItemResult::Ok(ProcessedItem {
                id: 1,
                detected_language: "en".to_string(),
                translated_text: "tip 1".to_string(),
                vector: vec![0.1; 3],
            })],
        };
        assert!(validate_response(&items, &response).is_err());
    }
}
