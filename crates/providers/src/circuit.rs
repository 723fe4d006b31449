//! Per-provider circuit breaker.
//!
//! Repeated failures open the circuit for a cool-off window; calls made
//! while open fail fast with `CircuitBreakerOpen`. The first call after the
//! window closes again on success.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ha_domain::{Error, Result};

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooloff: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooloff: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            cooloff,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Fail fast while the circuit is open and the cool-off has not
    /// elapsed. After the cool-off, one probe call is let through.
    pub fn check(&self) -> Result<()> {
        let state = self.state.lock();
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() < self.cooloff {
                return Err(Error::CircuitBreakerOpen(self.name.clone()));
            }
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            if state.opened_at.is_none() {
                tracing::warn!(
                    breaker = %self.name,
                    failures = state.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            state.opened_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.check().is_err()
    }
}
