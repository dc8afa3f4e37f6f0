//! Bounded retry with exponential backoff.
//!
//! [`RetryPolicy::execute`] wraps any zero-argument async operation. Every
//! error is retried until `max_attempts` is reached; the delay before attempt
//! `n + 1` is `base_delay * multiplier^(n - 1)`, capped at [`MAX_BACKOFF`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::Fetcher;
use crate::error::FetchError;

/// Longest delay ever waited between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry policy applied to every upstream fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Factor applied to the delay after every failed attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Attempts actually made when every call fails.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after `failed_attempt` (1-based) before the next one,
    /// capped at [`MAX_BACKOFF`].
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let secs = self.uncapped_backoff_secs(failed_attempt);
        if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
            return MAX_BACKOFF;
        }
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(MAX_BACKOFF))
            .unwrap_or(MAX_BACKOFF)
    }

    /// Whether the delay before the final attempt would exceed [`MAX_BACKOFF`].
    pub fn exceeds_max_backoff(&self) -> bool {
        let attempts = self.attempts();
        if attempts < 2 {
            return false;
        }
        let secs = self.uncapped_backoff_secs(attempts - 1);
        !secs.is_finite() || secs > MAX_BACKOFF.as_secs_f64()
    }

    fn uncapped_backoff_secs(&self, failed_attempt: u32) -> f64 {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.base_delay.as_secs_f64() * self.multiplier.powi(exponent)
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// Returns the first success, or the error of the final attempt.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => {
                    warn!(
                        attempts = attempt,
                        error = %err,
                        "retry_exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retry_scheduled"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Fetcher decorator that applies a [`RetryPolicy`] to every call.
///
/// Holds no per-call state, so the same instance is reused on every tick.
pub struct RetryingFetcher<T> {
    inner: Arc<dyn Fetcher<T>>,
    policy: RetryPolicy,
}

impl<T: Send + 'static> RetryingFetcher<T> {
    pub fn new(inner: Arc<dyn Fetcher<T>>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch with retries; fails only once every attempt has failed.
    pub async fn fetch_with_retry(&self) -> Result<Vec<T>, FetchError> {
        let inner = self.inner.as_ref();
        self.policy.execute(move || inner.fetch()).await
    }
}

#[async_trait]
impl<T: Send + 'static> Fetcher<T> for RetryingFetcher<T> {
    fn source(&self) -> &str {
        self.inner.source()
    }

    async fn fetch(&self) -> Result<Vec<T>, FetchError> {
        self.fetch_with_retry().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fetcher that fails a fixed number of times, then returns its records.
    struct FlakyFetcher {
        failures: u32,
        calls: AtomicU32,
        call_times: Mutex<Vec<Instant>>,
        records: Vec<i64>,
    }

    impl FlakyFetcher {
        fn new(failures: u32, records: Vec<i64>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
                records,
            }
        }
    }

    #[async_trait]
    impl Fetcher<i64> for FlakyFetcher {
        fn source(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self) -> Result<Vec<i64>, FetchError> {
            self.call_times.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(FetchError::Other(format!("attempt {} failed", call + 1)))
            } else {
                Ok(self.records.clone())
            }
        }
    }

    fn zero_delay(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, 2.0)
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_capped_for_huge_multiplier() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000), 1e300);
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), MAX_BACKOFF);
        assert!(policy.exceeds_max_backoff());
    }

    #[test]
    fn test_backoff_capped_for_many_attempts() {
        let policy = RetryPolicy::new(80, Duration::from_millis(1000), 2.0);
        assert_eq!(policy.backoff(79), MAX_BACKOFF);
        assert_eq!(policy.backoff(u32::MAX), MAX_BACKOFF);
        assert!(policy.exceeds_max_backoff());
    }

    #[test]
    fn test_backoff_non_finite_multiplier_is_capped() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000), f64::NAN);
        assert_eq!(policy.backoff(2), MAX_BACKOFF);
        assert!(policy.exceeds_max_backoff());
    }

    #[test]
    fn test_default_policy_within_max_backoff() {
        assert!(!RetryPolicy::default().exceeds_max_backoff());
        assert!(!RetryPolicy::new(1, Duration::from_secs(3600), 1e300).exceeds_max_backoff());
    }

    #[test]
    fn test_attempts_never_below_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, 2.0).attempts(), 1);
        assert_eq!(RetryPolicy::default().attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_multiplier_retries_without_panicking() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), String> = RetryPolicy::new(3, Duration::from_millis(1000), 1e300)
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<&str, FetchError> = zero_delay(3)
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("ok")
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), String> = zero_delay(3)
            .execute(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {n}"))
            })
            .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), String> = zero_delay(0)
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_attempt_result_after_backoff() {
        let inner = Arc::new(FlakyFetcher::new(2, vec![7, 8]));
        let fetcher: RetryingFetcher<i64> = RetryingFetcher::new(inner.clone(), RetryPolicy::default());

        let records = fetcher.fetch_with_retry().await.unwrap();

        assert_eq!(records, vec![7, 8]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);

        let times = inner.call_times.lock().unwrap().clone();
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(first_gap >= Duration::from_millis(1000) && first_gap < Duration::from_millis(1010));
        assert!(second_gap >= Duration::from_millis(2000) && second_gap < Duration::from_millis(2010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_makes_exactly_three_attempts() {
        let inner = Arc::new(FlakyFetcher::new(u32::MAX, vec![]));
        let fetcher: RetryingFetcher<i64> = RetryingFetcher::new(inner.clone(), RetryPolicy::default());

        let err = fetcher.fetch_with_retry().await.unwrap_err();

        assert_eq!(err.to_string(), "attempt 3 failed");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_state_between_calls() {
        let inner = Arc::new(FlakyFetcher::new(u32::MAX, vec![]));
        let fetcher: RetryingFetcher<i64> = RetryingFetcher::new(inner.clone(), RetryPolicy::default());

        assert!(fetcher.fetch_with_retry().await.is_err());
        assert!(fetcher.fetch_with_retry().await.is_err());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 6);
    }
}
