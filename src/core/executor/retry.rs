use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff for failed synthesis attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a job gets at most `max_retries + 1` attempts
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Growth factor per retry
    pub multiplier: f64,

    /// Upper bound on the un-jittered delay (milliseconds)
    pub max_delay_ms: u64,

    /// Relative jitter; 0.2 spreads each delay over ±20%
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Whether a job that has made `attempts` attempts may try again
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Backoff after failed attempt number `attempt` (1-based), before jitter.
    ///
    /// `base_delay * multiplier^(attempt-1)`, capped at `max_delay_ms`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let delay = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(delay as u64)
    }

    /// Backoff with jitter drawn from `rng`
    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt).as_millis() as f64;
        let factor = self.jitter_factor.clamp(0.0, 1.0);
        if factor == 0.0 || base == 0.0 {
            return Duration::from_millis(base as u64);
        }
        let spread = base * factor;
        let jittered = base + rng.gen_range(-spread..=spread);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Backoff with jitter from the thread-local generator
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_base_delay_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            ..Default::default()
        };
        assert_eq!(policy.base_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.base_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.base_delay(5), Duration::from_millis(16000));
        assert_eq!(policy.base_delay(6), Duration::from_millis(30000));
        assert_eq!(policy.base_delay(60), Duration::from_millis(30000));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy {
            base_delay_ms: 1000,
            jitter_factor: 0.2,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let delay = policy.delay_with(1, &mut rng).as_millis();
            assert!((800..=1200).contains(&delay), "delay {delay} outside ±20%");
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = RetryPolicy {
            base_delay_ms: 250,
            multiplier: 3.0,
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.delay(2), Duration::from_millis(750));
    }

    #[test]
    fn test_allows_retry_counts_total_attempts() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::none().allows_retry(1));
    }
}
