//! Resubmission of BatchWriteItem requests left unprocessed
//!
//! DynamoDB may accept only part of a batch and hand the rest back in
//! `UnprocessedItems` (typically under throttling). Those requests are sent
//! again with exponential backoff; only what is still pending after the last
//! attempt, or what was in flight when a call failed, is reported.

use crate::error::AwsStorageError;
use aws_sdk_dynamodb::types::WriteRequest;
use std::future::Future;
use std::time::Duration;

/// Resend schedule for unprocessed batch items
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchRetryConfig {
    /// Total BatchWriteItem calls per chunk, including the first
    pub max_attempts: u32,
    /// Delay before the first resend
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BatchRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

struct ExponentialBackoff {
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl ExponentialBackoff {
    fn new(config: &BatchRetryConfig) -> Self {
        Self {
            max: config.max_delay,
            multiplier: config.multiplier,
            current: config.initial_delay.min(config.max_delay),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(
            self.max,
            Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier),
        );
        delay
    }
}

/// What remains of a chunk once resending stops
#[derive(Debug)]
pub(crate) struct ChunkResult {
    /// Requests that were never acknowledged as written
    pub pending: Vec<WriteRequest>,
    /// Set when the last call failed outright; `pending` is what it carried
    pub error: Option<AwsStorageError>,
}

/// Send `requests`, resending whatever `send` returns as unprocessed.
///
/// `send` performs one BatchWriteItem call and yields the requests the
/// service handed back.
pub(crate) async fn write_with_retry<F, Fut>(
    config: &BatchRetryConfig,
    requests: Vec<WriteRequest>,
    mut send: F,
) -> ChunkResult
where
    F: FnMut(Vec<WriteRequest>) -> Fut,
    Fut: Future<Output = Result<Vec<WriteRequest>, AwsStorageError>>,
{
    let mut backoff = ExponentialBackoff::new(config);
    let mut pending = requests;
    let mut attempt = 0u32;

    while !pending.is_empty() {
        attempt += 1;
        match send(pending.clone()).await {
            Ok(unprocessed) => pending = unprocessed,
            Err(error) => {
                return ChunkResult {
                    pending,
                    error: Some(error),
                }
            }
        }

        if pending.is_empty() || attempt >= config.max_attempts.max(1) {
            break;
        }

        let delay = backoff.next_delay();
        tracing::debug!(
            unprocessed = pending.len(),
            attempt,
            retry_in_ms = delay.as_millis() as u64,
            "Resending unprocessed batch items"
        );
        tokio::time::sleep(delay).await;
    }

    ChunkResult {
        pending,
        error: None,
    }
}
