//! Bounded retry with exponential backoff for store operations.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use chunklift_store::{StoreError, StoreResult};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3).
    pub max_retries: u32,
    /// Initial backoff duration (default: 100ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 10 seconds).
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff (default: 2.0).
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to backoff (default: true).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Compute the backoff duration for a given zero-based attempt.
    ///
    /// `initial_backoff * backoff_multiplier^attempt`, capped at
    /// `max_backoff`, plus up to 50% jitter when enabled.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_backoff.as_millis() as f64;
        let max_delay_ms = self.max_backoff.as_millis() as f64;

        let computed = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = computed.min(max_delay_ms);

        if self.jitter {
            let jitter_ms = simple_jitter(capped as u64 / 2);
            Duration::from_millis((capped as u64).saturating_add(jitter_ms))
        } else {
            Duration::from_millis(capped as u64)
        }
    }
}

/// Generate simple jitter using system time entropy.
fn simple_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let nanos = Instant::now().elapsed().subsec_nanos() as u64;
    let ts_nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    (nanos ^ ts_nanos) % max_ms
}

/// Check if a store error is transient.
///
/// Transport failures and timeouts are worth retrying; everything else
/// (unknown uploads, rejected part lists, backend refusals) is permanent.
pub fn is_retryable(error: &StoreError) -> bool {
    matches!(
        error,
        StoreError::Transport { .. } | StoreError::Timeout { .. }
    )
}

/// Run `operation` until it succeeds, the error is permanent, or the retry
/// budget is exhausted; the final error is returned as-is.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> StoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt <= config.max_retries => {
                let backoff = config.backoff(attempt - 1);
                warn!(attempt, error = %err, backoff_ms = backoff.as_millis() as u64, "retrying store operation");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
