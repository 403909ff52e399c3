//! A reusable circuit breaker wrapping any remote call, per spec's
//! explicit redesign hint: `{closed, open, half_open}` states driven by
//! success/failure counts over a rolling window.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a half-open probe.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Whether a half-open probe is currently in flight — only one probe
    /// is let through at a time.
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Returned by `gate()` when the call should be attempted.
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    is_probe: bool,
}

impl Permit<'_> {
    pub fn record_success(self) {
        self.breaker.record_success(self.is_probe);
    }

    pub fn record_failure(self) {
        self.breaker.record_failure(self.is_probe);
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Returns `Some(permit)` if the call should proceed, `None` if the
    /// breaker is open and the cooldown hasn't elapsed (caller should fail
    /// fast with `CircuitBreakerOpen`).
    pub fn gate(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Some(Permit {
                breaker: self,
                is_probe: false,
            }),
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.cooldown && !inner.probe_in_flight {
                    inner.state = State::HalfOpen;
                    inner.probe_in_flight = true;
                    info!("circuit breaker half-open, allowing probe");
                    Some(Permit {
                        breaker: self,
                        is_probe: true,
                    })
                } else {
                    None
                }
            }
            State::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(Permit {
                        breaker: self,
                        is_probe: true,
                    })
                }
            }
        }
    }

    /// Milliseconds remaining until the next probe is allowed, for the
    /// `CircuitBreakerOpen { retry_after_ms }` error.
    pub fn retry_after_ms(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        match inner.opened_at {
            Some(t) => {
                let elapsed = t.elapsed();
                self.config.cooldown.saturating_sub(elapsed).as_millis() as u64
            }
            None => 0,
        }
    }

    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.state == State::Open
    }

    fn record_success(&self, was_probe: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        if was_probe {
            inner.probe_in_flight = false;
        }
        if inner.state != State::Closed {
            info!("circuit breaker closed after successful probe");
        }
        inner.state = State::Closed;
        inner.opened_at = None;
    }

    fn record_failure(&self, was_probe: bool) {
        let mut inner = self.inner.lock().unwrap();
        if was_probe {
            inner.probe_in_flight = false;
            warn!("circuit breaker probe failed, reopening");
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.config.failure_threshold {
            warn!(
                failures = inner.consecutive_failures,
                "circuit breaker opening"
            );
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_millis(50),
        })
    }

    #[test]
    fn closed_allows_calls_and_resets_on_success() {
        let cb = breaker();
        cb.gate().unwrap().record_failure();
        cb.gate().unwrap().record_success();
        assert!(!cb.is_open());
    }

    #[test]
    fn opens_after_consecutive_failure_threshold() {
        let cb = breaker();
        for _ in 0..3 {
            cb.gate().unwrap().record_failure();
        }
        assert!(cb.is_open());
        assert!(cb.gate().is_none());
    }

    #[test]
    fn half_open_probe_after_cooldown_closes_on_success() {
        let cb = breaker();
        for _ in 0..3 {
            cb.gate().unwrap().record_failure();
        }
        assert!(cb.is_open());
        std::thread::sleep(Duration::from_millis(60));
        let permit = cb.gate().expect("cooldown elapsed, probe allowed");
        permit.record_success();
        assert!(!cb.is_open());
    }

    #[test]
    fn failed_probe_reopens_breaker() {
        let cb = breaker();
        for _ in 0..3 {
            cb.gate().unwrap().record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        let permit = cb.gate().expect("probe allowed");
        permit.record_failure();
        assert!(cb.is_open());
    }
}
