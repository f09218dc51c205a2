//! Retry and politeness policies applied around fallible source requests.
//!
//! Retries belong to the extractors: each sub-unit (one month, one page, one
//! bulk request) is wrapped in [`RetryPolicy::run`]. Timeouts are per request
//! and count as one failed attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use civicfeeds_transport::TransportError;

use crate::config::SourceConfig;
use crate::error::ScrapeError;

/// Errors that know whether a further attempt is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ScrapeError {
    fn is_retryable(&self) -> bool {
        ScrapeError::is_retryable(self)
    }
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

/// Attempt budget plus exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub base: Duration,
    pub min: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            min: Duration::from_secs(2),
            max: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base: Duration::from_millis(config.backoff.base_ms),
            min: Duration::from_millis(config.backoff.min_ms),
            max: Duration::from_millis(config.backoff.max_ms),
            jitter: config.backoff.jitter,
        }
    }

    /// A policy that retries immediately. Useful for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
            jitter: false,
        }
    }

    /// Wait after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`
    /// clamped to `[min, max]`, optionally scaled by 0.8-1.2 jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(30);
        let exp = self.base.saturating_mul(1u32 << shift);
        let clamped = exp.max(self.min).min(self.max.max(self.min));
        if self.jitter && !clamped.is_zero() {
            let factor = rand::thread_rng().gen_range(0.8..1.2);
            clamped.mul_f64(factor)
        } else {
            clamped
        }
    }

    /// Delay before attempt `attempt + 1`, or `None` when `err` must surface:
    /// it is not retryable or the attempt budget is spent.
    pub fn next_delay<E: Retryable>(&self, attempt: u32, err: &E) -> Option<Duration> {
        if attempt >= self.max_attempts || !err.is_retryable() {
            None
        } else {
            Some(self.delay_for_attempt(attempt))
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    ///
    /// The last error is returned once the budget is exhausted.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.backoff(label, attempt, &err).await {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Logs `err` and sleeps before the next attempt. Returns `false`, without
    /// sleeping, when `err` must surface instead.
    ///
    /// For hand-written retry loops that cannot hand their state to [`run`](Self::run).
    pub async fn backoff<E>(&self, label: &str, attempt: u32, err: &E) -> bool
    where
        E: Retryable + Display,
    {
        let Some(delay) = self.next_delay(attempt, err) else {
            return false;
        };
        tracing::warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:.1}s",
            label,
            attempt,
            self.max_attempts,
            err,
            delay.as_secs_f64()
        );
        sleep(delay).await;
        true
    }
}

/// Mandatory pause between successive requests to one source.
#[derive(Debug, Clone, Copy)]
pub struct Politeness {
    interval: Duration,
}

impl Politeness {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn pause(&self) {
        if !self.interval.is_zero() {
            sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ScrapeError {
        ScrapeError::Transport(TransportError::HttpStatus {
            status: 503,
            body: String::new(),
        })
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_band() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for_attempt(3);
            assert!(d >= Duration::from_millis(3200) && d <= Duration::from_millis(4800));
        }
    }

    #[tokio::test]
    async fn two_failures_then_success_within_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, ScrapeError> = RetryPolicy::immediate(3)
            .run("month 2020-01", |_| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("rows")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "rows");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ScrapeError> = RetryPolicy::immediate(3)
            .run("bulk", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;
        assert!(matches!(result, Err(ScrapeError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ScrapeError> = RetryPolicy::immediate(5)
            .run("bulk", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ScrapeError::UnexpectedPayload("object".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempt_numbers_are_passed_through() {
        let seen = std::sync::Mutex::new(Vec::new());
        let _: Result<(), ScrapeError> = RetryPolicy::immediate(3)
            .run("page", |attempt| {
                seen.lock().unwrap().push(attempt);
                async { Err(ScrapeError::TokenExtraction { token: "__VIEWSTATE" }) }
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_only_while_budget_remains() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        let start = tokio::time::Instant::now();
        assert!(policy.backoff("page 2", 1, &transient()).await);
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        assert!(!policy.backoff("page 2", 3, &transient()).await);
        assert!(!policy.backoff("page 2", 1, &ScrapeError::Parse("x".into())).await);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn politeness_sleeps_for_interval() {
        let start = tokio::time::Instant::now();
        Politeness::new(Duration::from_secs(2)).pause().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_politeness_does_not_sleep() {
        let start = tokio::time::Instant::now();
        Politeness::new(Duration::ZERO).pause().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
