//! Bounded retry with per-attempt timeout and exponential backoff

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry policy for calls to external services.
///
/// Each attempt runs under `attempt_timeout`. Retryable failures (see
/// [`Error::is_retryable`]) are retried up to `max_attempts` in total with
/// exponential backoff; any other failure is returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60), Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is raised to at least 1
    pub fn new(max_attempts: u32, attempt_timeout: Duration, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            backoff_base,
        }
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Timeout applied to every attempt
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::ExternalTimeout(
                    operation.to_string(),
                    self.attempt_timeout.as_secs(),
                )),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "External call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(operation, attempts = attempt, error = %e, "Retry budget exhausted");
                    return Err(Error::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let backoff = self.backoff(attempt, e.retry_after());
                    warn!(
                        operation,
                        attempt,
                        wait_ms = backoff.as_millis() as u64,
                        error = %e,
                        "External call failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Backoff before the attempt following `attempt`, with up to 10% jitter
    fn backoff(&self, attempt: u32, suggested_wait_secs: Option<u64>) -> Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let suggested_ms = suggested_wait_secs.unwrap_or(0).saturating_mul(1000);
        let delay = exp.max(suggested_ms);

        let jitter_cap = (delay / 10).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        Duration::from_millis(delay.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(5), Duration::from_millis(10))
    }

    #[test]
    fn backoff_saturates_on_huge_base() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5), Duration::from_millis(u64::MAX));
        assert_eq!(policy.backoff(3, None), Duration::from_millis(u64::MAX));
        assert_eq!(
            policy.backoff(1, Some(u64::MAX)),
            Duration::from_millis(u64::MAX)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy(5)
            .run("embed", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(Error::ServiceUnavailable("502".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = fast_policy(5)
            .run("generate", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::LLMError("Unauthorized".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::LLMError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = fast_policy(3)
            .run("embed", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::RateLimited(1))
                }
            })
            .await;

        match result {
            Err(Error::RetriesExhausted {
                operation,
                attempts,
                last,
            }) => {
                assert_eq!(operation, "embed");
                assert_eq!(attempts, 3);
                assert!(matches!(*last, Error::RateLimited(1)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_millis(10));

        let result: Result<()> = policy
            .run("generate", || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        match result {
            Err(Error::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, Error::ExternalTimeout(..)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn backoff_grows_and_honours_suggested_wait() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_millis(100));

        let first = policy.backoff(1, None);
        let second = policy.backoff(2, None);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(111));
        assert!(second >= Duration::from_millis(200) && second < Duration::from_millis(221));

        let suggested = policy.backoff(1, Some(5));
        assert!(suggested >= Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);
    }
}
