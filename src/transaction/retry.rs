// region:    --- Imports
use crate::error::{AuctionError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::warn;

// endregion: --- Imports

// region:    --- Retry Policy
/// Bounded exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay after the failed attempt `attempt` (0-based): base * 2^attempt, capped,
    /// plus up to a quarter of that as jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 4;
        let extra = rand::thread_rng().gen_range(0..=spread);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or attempts run out.
    /// Exhaustion turns the last transient error into `Fatal`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt + 1 < self.max_attempts {
                        let delay = self.delay_for(attempt);
                        warn!(
                            "{:<12} --> {} attempt {}/{} failed: {}, retrying in {:?}",
                            "Retry",
                            label,
                            attempt + 1,
                            self.max_attempts,
                            e,
                            delay
                        );
                        time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(AuctionError::Fatal(format!(
            "{} failed after {} attempts: {}",
            label,
            self.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
// endregion: --- Retry Policy

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500))
            .without_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::new(3, Duration::from_millis(400));
        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let result = policy
            .run("op", move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AuctionError::transient("serialization failure"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_fatal() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let result: Result<()> = policy
            .run("settlement", |_| async {
                Err(AuctionError::transient("lock timeout"))
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("settlement failed after 3 attempts"));
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let result: Result<()> = policy
            .run("op", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AuctionError::SelfBid)
            })
            .await;
        assert!(matches!(result, Err(AuctionError::SelfBid)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
