//! Reconnect backoff policy (spec.md §4.3 "exponential backoff with
//! jitter", component C11). Grounded on
//! `glide-core/src/retry_strategies.rs` (`get_exponential_backoff`), which
//! builds the same `tokio_retry::strategy::ExponentialBackoff` + jitter
//! pipeline this module exposes as a standalone, reusable policy.

use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};

/// Default base used by `glide-core`'s reconnect strategy: factor-2 growth
/// starting at 100ms.
const DEFAULT_FACTOR_MS: u64 = 100;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    factor_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            factor_ms: DEFAULT_FACTOR_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    pub fn new(factor_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        BackoffPolicy {
            factor_ms,
            max_delay_ms,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Produces the jittered delay sequence, capped at `max_attempts`
    /// entries and each entry capped at `max_delay_ms`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.factor_ms)
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .map(jitter)
            .take(self.max_attempts as usize)
    }

    /// The delay before the given 1-based attempt, clamped to the last
    /// configured step if `attempt` exceeds `max_attempts`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1).min(self.max_attempts - 1) as usize;
        self.delays().nth(idx).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_sequence_is_bounded() {
        let policy = BackoffPolicy::new(100, 8_000, 10);
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(delays.len(), 10);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(8_000)));
    }

    #[test]
    fn delay_for_clamps_to_last_step() {
        let policy = BackoffPolicy::new(50, 1_000, 3);
        let last = policy.delay_for(3);
        assert_eq!(policy.delay_for(99), last);
    }
}
