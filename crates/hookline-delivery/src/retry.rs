//! Exponential backoff with multiplicative jitter.
//!
//! Maps the number of completed attempts to the delay before the next one:
//! `min(base × 2^(n−1), max)` scaled by a jitter factor drawn uniformly
//! from `[0.5, 1.5]`. The exponential spreads load across failures, the cap
//! bounds worst-case latency, and the jitter decorrelates retries of events
//! that failed together.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Lower bound of the jitter factor.
const JITTER_MIN: f64 = 0.5;

/// Upper bound of the jitter factor.
const JITTER_MAX: f64 = 1.5;

/// Backoff schedule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Base delay, doubled with each completed attempt.
    pub base_delay: Duration,

    /// Cap applied before jitter.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(2), max_delay: Duration::from_secs(3600) }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt, given `attempt_count` completed
    /// attempts, using the provided RNG for jitter.
    ///
    /// `attempt_count` is 1 after the first failure, so the first retry
    /// waits roughly one base delay. The exponent saturates well below
    /// overflow; the cap applies before jitter, so the realized delay can
    /// exceed `max_delay` by at most the jitter factor.
    ///
    /// Accepting the RNG as a parameter keeps the schedule deterministic
    /// under a seeded generator in tests.
    pub fn next_delay_with<R: Rng>(&self, attempt_count: u32, rng: &mut R) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(20);
        let uncapped = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        let capped = uncapped.min(self.max_delay);

        let jitter = rng.random_range(JITTER_MIN..=JITTER_MAX);
        Duration::from_secs_f64(capped.as_secs_f64() * jitter)
    }

    /// Delay before the next attempt using the thread-local RNG.
    pub fn next_delay(&self, attempt_count: u32) -> Duration {
        self.next_delay_with(attempt_count, &mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy { base_delay: Duration::from_secs(2), max_delay: Duration::from_secs(3600) }
    }

    #[test]
    fn delays_stay_within_jitter_bounds() {
        let policy = policy();
        let mut rng = StdRng::seed_from_u64(7);

        for (attempt, expected_secs) in [(1u32, 2.0f64), (2, 4.0), (3, 8.0), (4, 16.0)] {
            for _ in 0..50 {
                let delay = policy.next_delay_with(attempt, &mut rng).as_secs_f64();
                assert!(
                    (expected_secs * 0.5..=expected_secs * 1.5).contains(&delay),
                    "attempt {attempt}: delay {delay}s outside [{}, {}]",
                    expected_secs * 0.5,
                    expected_secs * 1.5,
                );
            }
        }
    }

    #[test]
    fn expected_delay_grows_until_cap() {
        let policy = policy();
        let mut rng = StdRng::seed_from_u64(42);

        // Averaging over many samples removes the jitter; expected values
        // double per attempt until the cap.
        let mean = |attempt: u32, rng: &mut StdRng| -> f64 {
            (0..2000)
                .map(|_| policy.next_delay_with(attempt, rng).as_secs_f64())
                .sum::<f64>()
                / 2000.0
        };

        let mut previous = mean(1, &mut rng);
        for attempt in 2..=8 {
            let current = mean(attempt, &mut rng);
            assert!(
                current > previous,
                "expected delay for attempt {attempt} ({current}) not above previous ({previous})"
            );
            previous = current;
        }
    }

    #[test]
    fn cap_bounds_large_attempt_counts() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        };
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..100 {
            let delay = policy.next_delay_with(30, &mut rng);
            // Cap applies before jitter, so the ceiling is max_delay * 1.5.
            assert!(delay <= Duration::from_secs(90));
        }
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        let policy = policy();

        let a = policy.next_delay_with(3, &mut StdRng::seed_from_u64(99));
        let b = policy.next_delay_with(3, &mut StdRng::seed_from_u64(99));

        assert_eq!(a, b);
    }

    #[test]
    fn huge_attempt_count_does_not_overflow() {
        let policy = policy();
        let mut rng = StdRng::seed_from_u64(5);

        let delay = policy.next_delay_with(u32::MAX, &mut rng);
        assert!(delay <= Duration::from_secs(5400));
    }
}
