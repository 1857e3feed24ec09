//! Bounded retry with exponential backoff and jitter.
//!
//! Every network operation of the relay goes through [`retry`]. The caller
//! decides which failures are worth another attempt; the final failure is
//! returned unchanged so its kind survives up to the HTTP layer.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use mediarelay_core::{AppError, ErrorMetadata};
use rand::Rng;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// How many times to try and how long to wait in between
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `min(base * 2^(attempt-1), max)` for a 1-based attempt number.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus a random jitter of up to half of it, never above `max_delay`.
    ///
    /// Capping the sum keeps successive delays non-decreasing: below the cap
    /// each step doubles, so the previous step's jitter cannot overtake it.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        let half_ms = (backoff.as_millis() / 2) as u64;
        let jitter_ms = if half_ms > 0 {
            rand::rng().random_range(0..=half_ms)
        } else {
            0
        };
        (backoff + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error or
/// runs out of attempts. The operation receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`retry`] for `AppError`, retrying whatever the error reports as recoverable.
pub async fn retry_recoverable<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    retry(policy, |e: &AppError| e.is_recoverable(), operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            Duration::from_millis(1_000),
        )
    }

    #[test]
    fn backoff_exponential_then_capped() {
        let p = policy(10);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(800));
        assert_eq!(p.backoff(5), Duration::from_millis(1_000));
        assert_eq!(p.backoff(40), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_half_of_backoff_and_cap() {
        let p = policy(10);
        for attempt in 1..8 {
            for _ in 0..50 {
                let delay = p.delay_for(attempt);
                let backoff = p.backoff(attempt);
                assert!(delay >= backoff);
                assert!(delay <= backoff + backoff / 2);
                assert!(delay <= p.max_delay);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_once_per_failure_with_non_decreasing_delays() {
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let failures = 4;

        let recorded = calls.clone();
        let result = retry(&policy(6), |_: &AppError| true, |attempt| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(Instant::now());
                if attempt <= failures {
                    Err(AppError::Transport("connection reset".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), failures + 1);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len() as u32, failures + 1);

        let delays: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(delays.len() as u32, failures);
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1], "delays decreased: {:?}", delays);
        }
        for delay in &delays {
            assert!(*delay >= Duration::from_millis(100));
            assert!(*delay <= Duration::from_millis(1_000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn final_error_is_returned_unchanged() {
        let mut attempts = 0;
        let result: Result<(), AppError> = retry_recoverable(&policy(3), |_| {
            attempts += 1;
            async { Err(AppError::UploadTransport("timed out".to_string())) }
        })
        .await;

        assert_eq!(attempts, 3);
        assert!(matches!(result, Err(AppError::UploadTransport(ref m)) if m == "timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let started = Instant::now();
        let mut attempts = 0;
        let result: Result<(), AppError> = retry_recoverable(&policy(5), |_| {
            attempts += 1;
            async { Err(AppError::UploadRejected("Error: file type not allowed".to_string())) }
        })
        .await;

        assert_eq!(attempts, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(matches!(result, Err(AppError::UploadRejected(_))));
    }

    #[tokio::test]
    async fn single_attempt_policy_never_sleeps() {
        let mut attempts = 0;
        let result: Result<u8, String> = retry(&RetryPolicy::no_retry(), |_| true, |_| {
            attempts += 1;
            async { Err("boom".to_string()) }
        })
        .await;

        assert_eq!(attempts, 1);
        assert_eq!(result.unwrap_err(), "boom");
    }
}
