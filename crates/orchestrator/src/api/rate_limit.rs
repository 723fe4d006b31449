//! Sliding-window rate limiter applied at the HTTP edge.
//!
//! One request log per client identifier, pruned to the last 60 seconds.
//! Violators receive `429` with a `Retry-After` computed from the oldest
//! in-window entry.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    limit: u32,
    enabled: bool,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

/// Outcome of a rate-limit check.
pub enum RateDecision {
    Allowed,
    /// Denied; retry after this many seconds.
    Limited { retry_after_secs: u64 },
}

impl RateLimiter {
    pub fn new(limit: u32, enabled: bool) -> Self {
        Self {
            limit,
            enabled,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record one request for `client_id`.
    pub fn check(&self, client_id: &str) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock();
        let log = windows.entry(client_id.to_string()).or_default();

        while let Some(oldest) = log.front() {
            if now.duration_since(*oldest) >= WINDOW {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.limit as usize {
            let oldest = log.front().copied().unwrap_or(now);
            let retry_after = WINDOW.saturating_sub(now.duration_since(oldest));
            return RateDecision::Limited {
                retry_after_secs: retry_after.as_secs().max(1),
            };
        }

        log.push_back(now);
        RateDecision::Allowed
    }

    /// Drop client logs with no recent activity.
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows.lock().retain(|_, log| {
            log.back()
                .map(|last| now.duration_since(*last) < WINDOW)
                .unwrap_or(false)
        });
    }
}

/// Derive a stable client identifier from the trusted connection info.
/// Hashed so raw addresses never appear in logs or memory dumps.
pub fn client_id(remote: &str, forwarded_for: Option<&str>) -> String {
    let source = forwarded_for
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(remote);
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_under_limit() {
        let limiter = RateLimiter::new(5, true);
        for _ in 0..5 {
            assert!(matches!(limiter.check("c1"), RateDecision::Allowed));
        }
    }

    #[test]
    fn limits_over_limit_with_retry_after() {
        let limiter = RateLimiter::new(3, true);
        for _ in 0..3 {
            limiter.check("c1");
        }
        match limiter.check("c1") {
            RateDecision::Limited { retry_after_secs } => {
                assert!(retry_after_secs >= 1);
                assert!(retry_after_secs <= 60);
            }
            RateDecision::Allowed => panic!("expected limit"),
        }
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, true);
        limiter.check("c1");
        assert!(matches!(limiter.check("c2"), RateDecision::Allowed));
        assert!(matches!(limiter.check("c1"), RateDecision::Limited { .. }));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(0, false);
        for _ in 0..100 {
            assert!(matches!(limiter.check("c1"), RateDecision::Allowed));
        }
    }

    #[test]
    fn client_id_prefers_forwarded_for() {
        let direct = client_id("10.0.0.1:4000", None);
        let forwarded = client_id("10.0.0.1:4000", Some("203.0.113.7, 10.0.0.1"));
        assert_ne!(direct, forwarded);
        // Same forwarded chain → same id.
        assert_eq!(
            forwarded,
            client_id("10.9.9.9:1234", Some("203.0.113.7, 10.9.9.9"))
        );
        assert_eq!(forwarded.len(), 16);
    }

    #[test]
    fn prune_drops_idle_clients() {
        let limiter = RateLimiter::new(5, true);
        limiter.check("c1");
        limiter.prune();
        // c1 is still fresh, so the entry survives.
        assert_eq!(limiter.windows.lock().len(), 1);
    }
}
