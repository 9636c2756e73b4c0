//! Circuit breaker shared by every adapter behind one HTTP fetcher.
//!
//! HTTP 403 trips it at once; repeated 429/5xx/connection failures trip it after
//! a threshold. While open, adapters fail fast with
//! `SourceError::CircuitBreakerTripped` and the merger simply omits the ticker.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Closed,
    Open { since: Instant },
}

#[derive(Debug)]
struct Inner {
    gate: Gate,
    consecutive_failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                gate: Gate::Closed,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a request may go out now. An expired cooldown closes the gate.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock();
        match inner.gate {
            Gate::Closed => true,
            Gate::Open { since } if since.elapsed() >= self.cooldown => {
                inner.gate = Gate::Closed;
                inner.consecutive_failures = 0;
                true
            }
            Gate::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold && inner.gate == Gate::Closed {
            warn!(
                failures = inner.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "circuit breaker opened after repeated source failures"
            );
            inner.gate = Gate::Open {
                since: Instant::now(),
            };
        }
    }

    /// Open immediately (HTTP 403 / IP ban).
    pub fn trip(&self) {
        warn!(
            cooldown_secs = self.cooldown.as_secs(),
            "circuit breaker tripped by provider block"
        );
        self.lock().gate = Gate::Open {
            since: Instant::now(),
        };
    }

    pub fn remaining_cooldown(&self) -> Duration {
        match self.lock().gate {
            Gate::Closed => Duration::ZERO,
            Gate::Open { since } => self.cooldown.saturating_sub(since.elapsed()),
        }
    }
}
