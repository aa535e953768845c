//! Circuit breaker implementation with atomic counters and a cooldown timer.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::behavior::{CircuitBreakerBehavior, CircuitState};

/// A circuit breaker tracking consecutive failures and successes, opening
/// after `failure_threshold` consecutive failures and closing again after
/// `success_threshold` consecutive successes once the cooldown has elapsed.
#[derive(Debug)]
pub struct CircuitBreakerMetrics {
    failure_threshold: u32,
    success_threshold: u32,
    cooldown: Duration,
    failures: AtomicU32,
    successes: AtomicU32,
    opened_at_millis: AtomicU64,
    label: String,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl CircuitBreakerMetrics {
    pub fn new(failure_threshold: u32, cooldown: Duration, label: impl Into<String>) -> Self {
        Self::with_success_threshold(failure_threshold, 1, cooldown, label)
    }

    pub fn with_success_threshold(
        failure_threshold: u32,
        success_threshold: u32,
        cooldown: Duration,
        label: impl Into<String>,
    ) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            cooldown,
            failures: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            label: label.into(),
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        let opened_at = self.opened_at_millis.load(Ordering::Relaxed);
        if opened_at == 0 {
            return false;
        }
        now_millis().saturating_sub(opened_at) >= self.cooldown.as_millis() as u64
    }
}

impl CircuitBreakerBehavior for CircuitBreakerMetrics {
    fn state(&self) -> CircuitState {
        let opened_at = self.opened_at_millis.load(Ordering::Relaxed);
        if opened_at == 0 {
            return CircuitState::Closed;
        }
        if self.cooldown_elapsed() {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.success_threshold {
                    self.opened_at_millis.store(0, Ordering::Relaxed);
                    self.failures.store(0, Ordering::Relaxed);
                    self.successes.store(0, Ordering::Relaxed);
                    tracing::info!(component = %self.label, "circuit breaker closed after recovery");
                }
            }
            CircuitState::Closed => {
                self.failures.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.opened_at_millis.store(now_millis(), Ordering::Relaxed);
                self.successes.store(0, Ordering::Relaxed);
                tracing::warn!(component = %self.label, "circuit breaker re-opened after half-open failure");
            }
            CircuitState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.failure_threshold {
                    self.opened_at_millis.store(now_millis(), Ordering::Relaxed);
                    tracing::warn!(component = %self.label, failures, "circuit breaker opened");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn current_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Minimal metrics sink; the default implementation logs via `tracing`
/// rather than exporting to a metrics backend, matching the scope of this
/// spec (no dedicated observability stack requested).
pub trait MetricsCollector: Send + Sync {
    fn record_state_change(&self, component: &str, state: CircuitState);
}

#[derive(Debug, Default)]
pub struct TracingMetricsCollector;

impl MetricsCollector for TracingMetricsCollector {
    fn record_state_change(&self, component: &str, state: CircuitState) {
        tracing::info!(component, ?state, "circuit breaker state change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreakerMetrics::new(3, Duration::from_secs(30), "test");
        assert!(!cb.is_open());
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
        cb.record_failure();
        assert!(cb.is_open());
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let cb = CircuitBreakerMetrics::new(3, Duration::from_secs(30), "test");
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.current_failures(), 0);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreakerMetrics::with_success_threshold(
            1,
            1,
            Duration::from_millis(0),
            "test",
        );
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let cb = CircuitBreakerMetrics::with_success_threshold(
            1,
            1,
            Duration::from_millis(0),
            "test",
        );
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.current_failures(), 0);
    }
}
