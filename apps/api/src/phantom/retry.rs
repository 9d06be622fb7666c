//! Bounded retry with a delay schedule.
//!
//! Launch, artifact retrieval and LLM calls all go through [`retry`]; no call
//! site hand-rolls its own loop. Every policy has a fixed attempt ceiling.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed(Duration),
    /// `base * n` after the n-th failure: 10s, 20s, 30s ...
    Linear(Duration),
    /// `base * 2^(n-1)` after the n-th failure: 1s, 2s, 4s ...
    Exponential(Duration),
}

impl Backoff {
    /// Delay to wait after the `failed_attempt`-th failure (1-based).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let n = failed_attempt.max(1);
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(base) => base.saturating_mul(n),
            Backoff::Exponential(base) => base.saturating_mul(2u32.saturating_pow(n - 1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A policy that makes exactly one attempt.
    pub const fn once() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("not retryable: {0}")]
    Aborted(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted(e) => e,
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt ceiling is reached. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => {
                warn!("{label}: attempt {attempt} failed with a non-retryable error: {e}");
                return Err(RetryError::Aborted(e));
            }
            Err(e) if attempt >= max_attempts => {
                warn!("{label}: attempt {attempt}/{max_attempts} failed, giving up: {e}");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.backoff.delay_after(attempt);
                warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed: {e}; retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable={})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn test_linear_schedule() {
        let b = Backoff::Linear(Duration::from_secs(10));
        assert_eq!(b.delay_after(1), Duration::from_secs(10));
        assert_eq!(b.delay_after(2), Duration::from_secs(20));
        assert_eq!(b.delay_after(3), Duration::from_secs(30));
    }

    #[test]
    fn test_exponential_schedule() {
        let b = Backoff::Exponential(Duration::from_secs(1));
        assert_eq!(b.delay_after(1), Duration::from_secs(1));
        assert_eq!(b.delay_after(2), Duration::from_secs(2));
        assert_eq!(b.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_fixed_schedule_ignores_attempt() {
        let b = Backoff::Fixed(Duration::from_secs(5));
        assert_eq!(b.delay_after(1), b.delay_after(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts_with_linear_delays() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let policy = RetryPolicy::new(3, Backoff::Linear(Duration::from_secs(10)));

        let result: Result<(), _> = retry(policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { retryable: true }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        // 10s after the first failure, 20s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Backoff::Linear(Duration::from_secs(10)));

        let result: Result<(), _> = retry(policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { retryable: false }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Aborted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_second_attempt() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_secs(1)));

        let result = retry(policy, "test", |attempt| async move {
            if attempt < 2 {
                Err(TestError { retryable: true })
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_once_policy_makes_single_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(RetryPolicy::once(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { retryable: true }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().into_inner().retryable);
    }
}
