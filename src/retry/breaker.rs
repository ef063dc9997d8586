//! Circuit breaker, one instance per fully-qualified function name
//! (spec §4.B). State transitions are atomic (guarded by a short-lived
//! `std::sync::Mutex` never held across the wrapped call, per spec §5).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub min_requests: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            min_requests: 10,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    request_count: u32,
    last_failure_at: Option<Instant>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                request_count: 0,
                last_failure_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Gate a call: returns `Ok(())` if the call may proceed, transitioning
    /// `Open` → `HalfOpen` when `recovery_timeout` has elapsed.
    pub fn before_call(&self, function: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(CoreError::BreakerOpen {
                        function: function.to_string(),
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.request_count += 1;
        inner.success_count += 1;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.request_count = 0;
            }
            CircuitState::Closed => {}
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.request_count += 1;
        inner.failure_count += 1;
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
            }
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold
                    && inner.request_count >= self.config.min_requests
                {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }
}

/// Process-scoped registry keyed by fully-qualified function name.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    pub fn get_or_create(&self, function: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(function.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.default_config.clone())))
            .clone()
    }

    pub fn snapshot_states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures_within_min_requests() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 5,
            min_requests: 10,
            recovery_timeout: Duration::from_millis(50),
        });

        for _ in 0..10 {
            breaker.before_call("f").unwrap();
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.before_call("f").is_err());
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 2,
            min_requests: 2,
            recovery_timeout: Duration::from_millis(10),
        });
        breaker.before_call("f").unwrap();
        breaker.record_failure();
        breaker.before_call("f").unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        breaker.before_call("f").unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            min_requests: 1,
            recovery_timeout: Duration::from_millis(10),
        });
        breaker.before_call("f").unwrap();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        breaker.before_call("f").unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_reuses_breaker_per_function_name() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let a = registry.get_or_create("f");
        let b = registry.get_or_create("f");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
