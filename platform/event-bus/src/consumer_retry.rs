//! Retry with exponential backoff for broker setup
//!
//! Connecting to the broker and declaring topology can fail transiently while the
//! broker is starting. Those calls are retried here; errors the caller marks as
//! permanent (e.g. a topology conflict) are returned on the first attempt.
//!
//! Message processing is never retried in-process: a failed message is nacked and
//! redelivered by the broker.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration (doubles on each retry)
    pub initial_backoff: Duration,
    /// Maximum backoff duration to cap exponential growth
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Retry a fallible async operation with exponential backoff
///
/// # Arguments
/// * `operation` - The async operation to retry
/// * `config` - Retry configuration
/// * `context` - Context string for logging (e.g., "declare_recipe_topology")
/// * `should_retry` - Returns false for errors that retrying cannot fix
///
/// # Example
/// ```rust
/// use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
/// use event_bus::BusError;
///
/// # async fn example() -> Result<(), BusError> {
/// let config = RetryConfig::default();
/// let value = retry_with_backoff(
///     || async { Ok::<_, BusError>(42) },
///     &config,
///     "example_operation",
///     BusError::is_retriable,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    operation: F,
    config: &RetryConfig,
    context: &str,
    should_retry: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + Send,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        context = %context,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if !should_retry(&e) => {
                warn!(
                    context = %context,
                    attempt = attempt,
                    error = %e,
                    "Operation failed with a permanent error"
                );
                return Err(e);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        context = %context,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                warn!(
                    context = %context,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Operation failed, retrying with backoff"
                );

                sleep(backoff).await;

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
