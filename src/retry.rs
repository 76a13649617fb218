//! Retry and timeout wrappers. The backoff formula and cap mirror the
//! transport retry policy this crate's lineage already used for upstream
//! HTTP calls, generalized into a reusable wrapper over any fallible async
//! operation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{CanonicalError, ErrorKind};

/// Backoff policy for [`with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(10);
        let scaled = self.base_delay.as_millis().saturating_mul(1u128 << exp);
        let capped = scaled.min(self.max_delay.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }
}

/// Outcome of a retried operation: distinguishes "gave the caller's error
/// back after exhausting retries" from "aborted because cancelled", without
/// the wrapper itself throwing.
#[derive(Debug)]
pub enum RetryResult<T> {
    Ok(T),
    ExhaustedRetries(CanonicalError),
    Cancelled,
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, CanonicalError> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::ExhaustedRetries(err) => Err(err),
            Self::Cancelled => Err(CanonicalError::cancelled()),
        }
    }
}

/// Retry `op` according to `policy`. Only errors whose `ErrorKind` is
/// recoverable are retried; anything else returns immediately. Cancellation
/// observed during the backoff sleep aborts the loop (not counted as a
/// retry attempt) and returns `RetryResult::Cancelled`.
pub async fn with_retry<F, Fut, T>(
    mut op: F,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CanonicalError>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return RetryResult::Cancelled;
        }
        match op().await {
            Ok(value) => return RetryResult::Ok(value),
            Err(err) if err.recoverable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff_delay(attempt);
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return RetryResult::Cancelled,
                }
                attempt += 1;
            }
            Err(err) => return RetryResult::ExhaustedRetries(err),
        }
    }
}

/// Race `fut` against a `duration` timer. On timeout, returns
/// `ErrorKind::Timeout`.
pub async fn with_timeout<Fut, T>(fut: Fut, duration: Duration) -> Result<T, CanonicalError>
where
    Fut: Future<Output = Result<T, CanonicalError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(CanonicalError::timeout(format!(
            "operation exceeded {duration:?}"
        ))),
    }
}

/// Convenience for building a non-recoverable error outside the main
/// classification path (e.g. when an adapter already knows the kind).
#[must_use]
pub fn err(kind: ErrorKind, message: impl Into<String>) -> CanonicalError {
    CanonicalError::new(kind, message)
}
