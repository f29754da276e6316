//! Polling with a deadline and cancellation
//!
//! Both issuance waits (request visible, request signed) go through
//! [`wait_for`]. A poll returns `Ok(Some(_))` when done, `Ok(None)` to keep
//! waiting and `Err(_)` to abort; errors are never retried here.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

/// Default poll interval (2 seconds)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default deadline for a single wait (10 minutes)
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// How often to poll and how long to keep trying
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between polls
    pub interval: Duration,
    /// Give up after this long; `None` waits forever
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: Some(DEFAULT_WAIT_TIMEOUT),
        }
    }
}

impl PollPolicy {
    /// Poll at `interval` with no deadline
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }
}

/// Poll until `poll_fn` yields a value, the deadline passes or `cancel` fires.
pub async fn wait_for<T, F, Fut>(
    description: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut poll_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("stopped waiting for {}", description)));
        }

        attempt += 1;
        if let Some(value) = poll_fn().await? {
            return Ok(value);
        }

        let mut delay = policy.interval;
        if let Some(deadline) = policy.deadline {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(Error::timeout(format!(
                    "gave up after {:?} waiting for {}",
                    deadline, description
                )));
            }
            delay = delay.min(deadline - elapsed);
        }

        debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting for {}", description);

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::cancelled(format!("stopped waiting for {}", description)));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
