use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;

/// Upper bound for a single backoff sleep.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Bounded retry for transient network failures.
///
/// The operation is attempted at most `max_attempts` times. Between attempts the
/// policy sleeps `delay * backoff^n`; a zero delay never touches the timer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 1.0,
        }
    }

    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = if backoff.is_finite() && backoff >= 1.0 {
            backoff
        } else {
            1.0
        };
        self
    }

    /// Single attempt, no sleeping.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[cfg(test)]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1` (zero-based `attempt`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        let secs = self.delay.as_secs_f64() * self.backoff.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let wait = self.delay_for(attempt);
                    debug!(attempt = attempt + 1, ?wait, "transient failure, retrying: {e}");
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = &AtomicU32::new(0);

        let result = policy
            .run(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FetchError::NetworkTransient("timeout".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::NetworkTransient("refused".into()))
            })
            .await;

        assert!(matches!(result, Err(FetchError::NetworkTransient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::NotFound)
            })
            .await;

        assert!(matches!(result, Err(FetchError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_backoff() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100)).with_backoff(2.0);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));

        let flat = RetryPolicy::new(4, Duration::from_millis(100)).with_backoff(0.5);
        assert_eq!(flat.delay_for(3), Duration::from_millis(100));
    }

    #[test]
    fn test_large_backoff_is_capped() {
        let policy = RetryPolicy::new(100, Duration::from_millis(1000)).with_backoff(2.0);
        assert_eq!(policy.delay_for(70), MAX_DELAY);
        assert_eq!(policy.delay_for(u32::MAX), MAX_DELAY);
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));

        let huge = RetryPolicy::new(2, Duration::MAX).with_backoff(10.0);
        assert_eq!(huge.delay_for(1), MAX_DELAY);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
