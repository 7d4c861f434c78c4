use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

/// Retry strategy for whole-batch attempts
pub trait BackoffPolicy: Send + Sync {
    /// Attempts per batch, including the first
    fn max_attempts(&self) -> u32;

    /// Delay before attempt `attempt + 1`, given `attempt` (1-based) just failed
    fn delay_for(&self, attempt: u32) -> Duration;
}

/// `base * multiplier^(attempt-1)`, capped at `max`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base: Duration,
    multiplier: f64,
    max: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(max_attempts: u32, base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            max_attempts,
            base,
            multiplier,
            max,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl From<&BackoffConfig> for ExponentialBackoff {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
        .with_jitter(config.jitter)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max.as_secs_f64());

        let seconds = if self.jitter && capped > 0.0 {
            rand::rng().random_range(capped / 2.0..=capped)
        } else {
            capped
        };

        Duration::from_secs_f64(seconds)
    }
}

/// Retries immediately; for tests and dry runs
#[derive(Debug, Clone)]
pub struct NoDelayBackoff {
    max_attempts: u32,
}

impl NoDelayBackoff {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl BackoffPolicy for NoDelayBackoff {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_for(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_and_cap() {
        let backoff = ExponentialBackoff::new(
            5,
            Duration::from_millis(1000),
            2.0,
            Duration::from_millis(5000),
        );

        assert_eq!(backoff.delay_for(1), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(4000));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(5000));
        assert_eq!(backoff.max_attempts(), 5);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let backoff = ExponentialBackoff::from(&BackoffConfig {
            jitter: true,
            ..BackoffConfig::default()
        });

        for _ in 0..50 {
            let delay = backoff.delay_for(2);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_no_delay() {
        let backoff = NoDelayBackoff::new(3);
        assert_eq!(backoff.delay_for(2), Duration::ZERO);
        assert_eq!(backoff.max_attempts(), 3);
    }
}
