use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::{sleep_until, Instant};

use crate::config::RateLimitConfig;
use crate::error::FetchError;

#[derive(Debug, Default)]
struct PacingState {
    last_call: Option<Instant>,
    calls_in_cycle: u32,
}

/// Shared call pacing for every upstream request
///
/// - at most `max_concurrency` calls in flight (token count)
/// - consecutive call starts at least `min_interval` apart
/// - an extra `cooldown` before the call that follows every `calls_per_cycle` calls
pub struct RateLimiter {
    tokens: Semaphore,
    max_concurrency: usize,
    min_interval: Duration,
    calls_per_cycle: u32,
    cooldown: Duration,
    state: Mutex<PacingState>,
    total_calls: AtomicU64,
    cooldowns: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            tokens: Semaphore::new(max_concurrency),
            max_concurrency,
            min_interval: Duration::from_millis(config.min_interval_ms),
            calls_per_cycle: config.calls_per_cycle,
            cooldown: Duration::from_millis(config.cooldown_ms),
            state: Mutex::new(PacingState::default()),
            total_calls: AtomicU64::new(0),
            cooldowns: AtomicU64::new(0),
        }
    }

    /// Wait for a token and for this call's start slot
    ///
    /// The returned permit must be held for the duration of the call.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, FetchError> {
        let permit = self
            .tokens
            .acquire()
            .await
            .map_err(|_| FetchError::Transient("rate limiter closed".to_string()))?;

        let mut state = self.state.lock().await;

        let cycle_complete =
            self.calls_per_cycle > 0 && state.calls_in_cycle >= self.calls_per_cycle;
        if let Some(last) = state.last_call {
            let mut start_at = last + self.min_interval;
            if cycle_complete {
                tracing::debug!(
                    "Rate limiter cooldown of {:?} after {} calls",
                    self.cooldown,
                    state.calls_in_cycle
                );
                start_at += self.cooldown;
            }
            sleep_until(start_at).await;
        }
        if cycle_complete {
            state.calls_in_cycle = 0;
            self.cooldowns.fetch_add(1, Ordering::Relaxed);
        }

        state.last_call = Some(Instant::now());
        state.calls_in_cycle += 1;
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        Ok(permit)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn cooldowns(&self) -> u64 {
        self.cooldowns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_interval_ms: u64, calls_per_cycle: u32, cooldown_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            min_interval_ms,
            calls_per_cycle,
            cooldown_ms,
            max_concurrency: 2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_between_calls() {
        let limiter = RateLimiter::new(&config(500, 0, 0));
        let start = Instant::now();

        for _ in 0..3 {
            let _permit = limiter.acquire().await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        assert_eq!(limiter.total_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_after_cycle() {
        let limiter = RateLimiter::new(&config(100, 2, 1000));
        let start = Instant::now();

        for _ in 0..5 {
            let _permit = limiter.acquire().await.unwrap();
        }

        // 4 spacings of 100ms plus cooldowns before the 3rd and 5th calls
        assert_eq!(start.elapsed(), Duration::from_millis(2400));
        assert_eq!(limiter.cooldowns(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_bound_concurrency() {
        let limiter = RateLimiter::new(&config(0, 0, 0));
        let first = limiter.acquire().await.unwrap();
        let _second = limiter.acquire().await.unwrap();

        let third = tokio::time::timeout(Duration::from_millis(10), limiter.acquire()).await;
        assert!(third.is_err());

        drop(first);
        assert!(limiter.acquire().await.is_ok());
        assert_eq!(limiter.max_concurrency(), 2);
    }
}
