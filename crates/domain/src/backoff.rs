//! Jittered exponential back-off shared by tool retries and job re-enqueues.

use std::time::Duration;

/// Controls retry pacing: `base × 2^attempt` capped at `max_delay`, plus
/// 10–30% jitter to spread retry storms.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between attempts (cap, pre-jitter).
    pub max_delay: Duration,
    /// Maximum number of attempts. `0` means no retries at all.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay for the given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * 2f64.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // 10–30% jitter to prevent thundering herd.
        let jitter = capped_ms * (0.1 + 0.2 * pseudo_random_fraction(attempt));
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether the given attempt number exhausts the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_retries
    }
}

/// Cheap deterministic "random" fraction [0, 1) based on attempt number.
/// Not cryptographically secure — just enough to spread retry storms.
fn pseudo_random_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let p = BackoffPolicy::default();
        assert_eq!(p.base_delay, Duration::from_secs(5));
        assert_eq!(p.max_retries, 3);
    }

    #[test]
    fn delay_grows_with_attempts() {
        let p = BackoffPolicy::default();
        let d0 = p.delay_for_attempt(0);
        let d1 = p.delay_for_attempt(1);
        let d2 = p.delay_for_attempt(2);
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn jitter_stays_within_band() {
        let p = BackoffPolicy {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(600),
            max_retries: 3,
        };
        for attempt in 0..8 {
            let base_ms = 5_000f64 * 2f64.powi(attempt);
            let capped = base_ms.min(600_000.0);
            let d = p.delay_for_attempt(attempt as u32).as_millis() as f64;
            assert!(d >= capped * 1.1 - 1.0, "attempt {attempt}: {d} below band");
            assert!(d <= capped * 1.3 + 1.0, "attempt {attempt}: {d} above band");
        }
    }

    #[test]
    fn delay_capped_at_max() {
        let p = BackoffPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            max_retries: 10,
        };
        let d = p.delay_for_attempt(10);
        // Never exceeds max_delay + 30% jitter.
        assert!(d <= Duration::from_millis(39_000));
    }

    #[test]
    fn exhausted_respects_max_retries() {
        let p = BackoffPolicy::default();
        assert!(!p.exhausted(2));
        assert!(p.exhausted(3));
        assert!(p.exhausted(4));
    }

    #[test]
    fn zero_retries_always_exhausted() {
        let p = BackoffPolicy {
            max_retries: 0,
            ..Default::default()
        };
        assert!(p.exhausted(0));
    }
}
