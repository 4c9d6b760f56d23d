use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

/// Exponential backoff wrapper for fallible network calls.
///
/// After the first failure the caller sleeps for `base_delay`, doubling on
/// each subsequent failure (0.5s, 1s, 2s, 4s, ...). With a `timeout` set,
/// the total elapsed time since the first attempt is capped; exceeding it
/// raises `RetryError::TimeoutExhausted` instead of re-attempting.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("unable to complete call before the deadline ({attempts} attempts)")]
    TimeoutExhausted { attempts: u32 },

    #[error(transparent)]
    Fatal(E),
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, timeout: Option<Duration>) -> Self {
        Self { base_delay, timeout }
    }

    /// Re-invoke `op` until it succeeds. `should_retry` decides, per failure,
    /// whether another attempt is allowed; a non-retryable failure is
    /// propagated immediately and unmodified.
    pub async fn run<T, E, F, Fut>(
        &self,
        should_retry: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if should_retry(&err) => {
                    warn!("caught retryable failure in retry handler: {}", err);
                    if let Some(deadline) = deadline
                        && Instant::now() > deadline
                    {
                        return Err(RetryError::TimeoutExhausted { attempts });
                    }
                    let delay = self.base_delay * 2u32.saturating_pow(attempts - 1);
                    info!("sleeping {:?} before retry", delay);
                    sleep(delay).await;
                }
                Err(err) => return Err(RetryError::Fatal(err)),
            }
        }
    }
}

impl From<RetryError<crate::error::WorkerError>> for crate::error::WorkerError {
    fn from(err: RetryError<crate::error::WorkerError>) -> Self {
        match err {
            RetryError::TimeoutExhausted { attempts } => {
                crate::error::WorkerError::RetryTimeoutExhausted { attempts }
            }
            RetryError::Fatal(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Error)]
    #[error("boom ({retryable})")]
    struct TestError {
        retryable: bool,
    }

    #[tokio::test]
    async fn non_retryable_failure_is_attempted_once() {
        let policy = RetryPolicy::new(Duration::from_millis(1), None);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(
                |e: &TestError| e.retryable,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError { retryable: false }) }
                },
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_failure_eventually_exhausts_deadline() {
        let policy =
            RetryPolicy::new(Duration::from_millis(5), Some(Duration::from_millis(40)));
        let calls = AtomicU32::new(0);

        let start = std::time::Instant::now();
        let result: Result<(), _> = policy
            .run(
                |_: &TestError| true,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError { retryable: true }) }
                },
            )
            .await;

        assert!(matches!(result, Err(RetryError::TimeoutExhausted { .. })));
        // The deadline must actually have elapsed before the error surfaced.
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(calls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn success_after_transient_failures() {
        let policy = RetryPolicy::new(Duration::from_millis(1), Some(Duration::from_secs(5)));
        let calls = AtomicU32::new(0);

        let result = policy
            .run(
                |_: &TestError| true,
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(TestError { retryable: true })
                        } else {
                            Ok(n)
                        }
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
