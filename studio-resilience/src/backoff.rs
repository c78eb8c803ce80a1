//! Exponential backoff with bounded additive jitter

use rand::Rng;
use std::time::Duration;

/// Backoff delay calculator
///
/// The delay before retry number `attempt_index` (0-based) is
/// `min(initial_delay * 2^attempt_index, max_delay)` plus a uniformly
/// distributed jitter in `[0, max_jitter]`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffCalculator {
    initial_delay: Duration,
    max_delay: Duration,
    max_jitter: Duration,
}

impl BackoffCalculator {
    /// Create a new backoff calculator
    pub fn new(initial_delay: Duration, max_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_jitter,
        }
    }

    /// Calculate delay for a specific attempt index, jitter included
    pub fn calculate_delay(&self, attempt_index: u32) -> Duration {
        self.base_delay(attempt_index) + self.jitter()
    }

    /// Capped exponential delay without jitter
    pub fn base_delay(&self, attempt_index: u32) -> Duration {
        let delay = 2u32
            .checked_pow(attempt_index)
            .and_then(|multiplier| self.initial_delay.checked_mul(multiplier))
            .unwrap_or(self.max_delay);

        delay.min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let bound = self.max_jitter.as_nanos().min(u64::MAX as u128) as u64;
        if bound == 0 {
            return Duration::ZERO;
        }

        Duration::from_nanos(rand::thread_rng().gen_range(0..=bound))
    }
}
