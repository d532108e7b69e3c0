use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Fixed-delay retry budget for a single operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one fails
    pub retries: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_millis(500),
        }
    }
}

/// Source of the pause between retries
///
/// Injected so tests can observe the requested delays without real timers.
#[async_trait::async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Delay backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait::async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs `operation` until it succeeds or the retry budget is spent
///
/// The final failure is returned exactly as the operation produced it. If
/// `cancel` fires while an attempt or a pause is pending, the call returns
/// [`AppError::Cancelled`] without further attempts.
pub async fn fetch_with_retry<T, F, Fut, D>(
    policy: &RetryPolicy,
    delay: &D,
    cancel: &CancellationToken,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    D: Delay + ?Sized,
{
    let mut remaining = policy.retries;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(err) if remaining == 0 => return Err(err),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    attempt,
                    remaining,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Operation failed, retrying after delay"
                );
                remaining -= 1;

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    _ = delay.wait(policy.delay) => {}
                }
            }
        }
    }
}
