//! Retry utilities with exponential backoff and jitter.
//!
//! Used for calls that can fail because another actor still holds a resource,
//! such as a signing request left by a concurrent run for the same host. Only
//! errors accepted by the caller's predicate are retried. A cancelled token
//! stops the loop before the next attempt and interrupts the backoff sleep.
//!
//! # Example
//!
//! ```ignore
//! use contrail_init::retry::{retry_with_backoff, RetryConfig};
//!
//! let created = retry_with_backoff(
//!     &RetryConfig::with_max_attempts(5),
//!     "create_request",
//!     &cancel,
//!     Error::is_retryable,
//!     || async { api.create_request(&csr).await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Returned when the retry loop is stopped by its cancellation token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} cancelled during retry backoff")]
pub struct Cancelled {
    /// Name of the operation that was being retried
    pub operation: String,
}

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Errors rejected by `should_retry` are returned immediately. Otherwise the
/// operation is retried until it succeeds or `max_attempts` is reached, in
/// which case the last error is returned. Once `cancel` fires no further
/// attempt is made and [`Cancelled`] is returned through `E`.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + From<Cancelled>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;
    let cancelled = || {
        info!(operation = %operation_name, "Retry loop cancelled");
        E::from(Cancelled {
            operation: operation_name.to_string(),
        })
    };

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(cancelled()),
                    _ = tokio::time::sleep(jittered_delay) => {}
                }

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Busy,
        Fatal,
        Stopped,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Stopped
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        }
    }

    fn busy(e: &TestError) -> bool {
        *e == TestError::Busy
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let cancel = CancellationToken::new();
        let result: Result<i32, TestError> =
            retry_with_backoff(&fast(3), "op", &cancel, busy, || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let cancel = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, TestError> =
            retry_with_backoff(&fast(5), "op", &cancel, busy, || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::Busy)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_max_attempts() {
        let cancel = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, TestError> =
            retry_with_backoff(&fast(3), "op", &cancel, busy, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Busy)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Busy));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_at_once() {
        let cancel = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, TestError> =
            retry_with_backoff(&fast(5), "op", &cancel, busy, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Fatal)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_every_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, TestError> =
            retry_with_backoff(&fast(5), "op", &cancel, busy, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Stopped));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 1.0,
        };
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let result: Result<i32, TestError> =
            retry_with_backoff(&config, "op", &cancel, busy, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Busy)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Stopped));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
