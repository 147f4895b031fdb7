use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Bounded exponential backoff for retryable gateway calls
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base * 2^(attempt-1), capped, plus up to 50% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);

        let jitter = if backoff > 1 {
            rand::thread_rng().gen_range(0..=backoff / 2)
        } else {
            0
        };

        Duration::from_millis(backoff.saturating_add(jitter).min(self.max_delay_ms))
    }
}
