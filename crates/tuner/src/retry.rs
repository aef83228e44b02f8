//! Cancellable retry runner.
//!
//! Applies a [`RetryPolicy`] to an async operation. Every attempt and every
//! backoff sleep races the [`CancellationToken`], so a torn-down job never
//! waits out a delay or acts on a late response.

use std::fmt::Display;
use std::future::Future;

use poetscrew_core::retry::{RetryPolicy, Retryable};
use tokio_util::sync::CancellationToken;

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded.
    Completed(T),
    /// The budget ran out, or a terminal failure ended it early.
    Exhausted { attempts: u32, last_error: E },
    /// The token was cancelled before the operation finished.
    Cancelled,
}

/// Run `op` until it succeeds, the budget is exhausted, or `cancel` fires.
///
/// `operation` names the request in log output.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            result = op() => result,
        };

        let error = match result {
            Ok(value) => return RetryOutcome::Completed(value),
            Err(e) => e,
        };

        if !error.is_retryable() || !policy.allows_retry(attempt) {
            tracing::error!(
                operation,
                attempt,
                retryable = error.is_retryable(),
                error = %error,
                "Giving up after {attempt} attempt(s)",
            );
            return RetryOutcome::Exhausted {
                attempts: attempt,
                last_error: error,
            };
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying",
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
