//! Capped exponential backoff for single remote calls.

use std::future::Future;
use std::time::Duration;

/// How many times to try a remote call and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to sleep after the failed attempt number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Run `op` until it succeeds or the policy runs out, returning the last error.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts => {
                tracing::warn!(
                    "Operation failed (attempt {}/{}): {e}",
                    attempt + 1,
                    attempts
                );
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let result: Result<u32, String> = with_retry(fast(3), || async move {
            let n = calls_ref.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(format!("timeout {n}"))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let result: Result<(), String> = with_retry(fast(2), || async move {
            let n = calls_ref.fetch_add(1, Ordering::SeqCst);
            Err(format!("failure {n}"))
        })
        .await;

        assert_eq!(result, Err("failure 1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let _: Result<(), &str> = with_retry(fast(0), || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err("nope")
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
