use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with up to 50% additive jitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Backoff {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Backoff {
    /// Base delay before retry number `attempt` (1-based), capped at `max_delay_ms`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let spread = base.as_millis() as u64 / 2;
        if spread == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..=spread);
        base + Duration::from_millis(jitter)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }

    #[test]
    fn test_base_delay_doubles_until_cap() {
        let b = backoff();
        assert_eq!(b.base_delay(1), Duration::from_millis(100));
        assert_eq!(b.base_delay(2), Duration::from_millis(200));
        assert_eq!(b.base_delay(4), Duration::from_millis(800));
        assert_eq!(b.base_delay(5), Duration::from_millis(1_000));
        assert_eq!(b.base_delay(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_half_of_base() {
        let b = backoff();
        for attempt in 1..=6 {
            let base = b.base_delay(attempt);
            let d = b.delay(attempt);
            assert!(d >= base);
            assert!(d <= base + base / 2);
        }
    }

    #[test]
    fn test_attempt_budget() {
        let b = backoff();
        assert!(b.allows(5));
        assert!(!b.allows(6));
    }
}
