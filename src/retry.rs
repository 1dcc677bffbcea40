//! Retry logic with exponential backoff
//!
//! Bounded retry for transient delivery failures, with exponential backoff and
//! optional jitter. Errors classify themselves through [`IsRetryable`]; a
//! non-retryable error is returned immediately so the caller can apply its own
//! policy (e.g. honoring a transport-mandated wait).

use crate::config::RetryConfig;
use crate::error::DeliveryError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets) return `true`. Permanent
/// failures and failures with their own handling policy return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        match self {
            // Generic transport errors are worth another attempt
            DeliveryError::Transport(_) => true,
            // A rate-limit signal carries a mandated wait; the job processor
            // handles it specially rather than blind-retrying
            DeliveryError::RateLimited { .. } => false,
        }
    }
}

/// Execute an async operation with bounded exponential-backoff retry
///
/// Runs `operation` up to `config.max_attempts` times. Between attempts the
/// delay grows by `config.backoff_multiplier`, capped at `config.max_delay`,
/// with uniform jitter up to 100% of the delay when `config.jitter` is set.
/// Returns the first success, the last error once attempts are exhausted, or
/// the first non-retryable error immediately.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 1;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to avoid retry synchronization
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
    delay + Duration::from_millis(jitter_ms)
}
