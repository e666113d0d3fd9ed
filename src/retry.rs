//! Shared retry policy for the embedding provider and the document store.
//!
//! Both failure domains use the same envelope: exponential backoff
//! starting at one second, capped at half the configured request timeout,
//! giving up after a fixed number of attempts. Only faults the caller
//! classifies as transient are retried; everything else surfaces on the
//! first occurrence. Backoff blocks the calling task (sleep-then-retry);
//! a started retry sequence runs to success or exhaustion.

use std::future::Future;
use std::time::Duration;

/// Parameters of one retry envelope.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first call included. Must be >= 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// The standard envelope: backoff base 1s capped at half the request
    /// timeout, mirroring `wait_exponential(multiplier=1, max=timeout/2)`.
    pub fn from_timeout(timeout: Duration, max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::from_secs(1), timeout / 2)
    }

    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }
}

/// Run `op` under `policy`, retrying while `is_transient` approves the
/// failure and attempts remain. Returns the last error on exhaustion or
/// the first non-transient error immediately.
pub async fn retry_async<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut is_transient: P,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_transient(&err) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off before retry"
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
    use std::cell::Cell;

    #[test]
    fn delays_double_until_capped() {
        let policy = RetryPolicy::from_timeout(Duration::from_secs(30), 6);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        // Cap at timeout / 2.
        assert_eq!(policy.delay_for(5), Duration::from_secs(15));
        assert_eq!(policy.delay_for(20), Duration::from_secs(15));
    }

    #[test]
    fn at_least_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(4));
        let calls = Cell::new(0u32);

        let result: Result<&str, String> = retry_async(
            &policy,
            |_| true,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(format!("transient #{n}"))
                    } else {
                        Ok("ok")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(4));
        let calls = Cell::new(0u32);

        let result: Result<(), String> = retry_async(
            &policy,
            |_| true,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err(format!("still down #{n}")) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "still down #3");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_fails_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(4));
        let calls = Cell::new(0u32);

        let result: Result<(), String> = retry_async(
            &policy,
            |_| false,
            || {
                calls.set(calls.get() + 1);
                async { Err("permanent".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
