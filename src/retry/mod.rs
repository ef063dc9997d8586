//! Retry policy and backoff strategies (spec §4.B).
//!
//! The per-attempt backoff bookkeeping mirrors `barter-data`'s
//! `ReconnectionState` (`streams/reconnect/stream.rs`): track the current
//! attempt, compute the next delay, reset on success — adapted here from a
//! stream-reconnect policy to a call-retry policy.

pub mod breaker;
pub mod monitor;
pub mod robust;

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    ExponentialBackoff,
    LinearBackoff,
    FibonacciBackoff,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    pub backoff_multiplier: f64,
    pub retriable_error_kinds: HashSet<ErrorKind>,
}

impl RetryPolicy {
    /// Un-jittered delay for attempt `n` (1-indexed), clamped to `max_delay`.
    pub fn base_delay_for_attempt(&self, n: u32) -> Duration {
        let n = n.max(1);
        let secs = self.base_delay.as_secs_f64();
        let raw = match self.strategy {
            BackoffStrategy::Fixed => secs,
            BackoffStrategy::LinearBackoff => secs * n as f64,
            BackoffStrategy::ExponentialBackoff => secs * self.backoff_multiplier.powi(n as i32 - 1),
            BackoffStrategy::FibonacciBackoff => secs * fib(n + 1) as f64,
        };
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }

    /// Delay for attempt `n`, including jitter (uniform in `[0.5, 1.0]` of
    /// the base delay) when enabled.
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        let base = self.base_delay_for_attempt(n);
        if self.jitter {
            let factor = rand::rng().random_range(0.5..=1.0);
            Duration::from_secs_f64(base.as_secs_f64() * factor)
        } else {
            base
        }
    }

    pub fn is_retriable(&self, kind: ErrorKind) -> bool {
        self.retriable_error_kinds.contains(&kind)
    }

    pub fn fast() -> Self {
        Self {
            max_attempts: 2,
            strategy: BackoffStrategy::Fixed,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: true,
            backoff_multiplier: 2.0,
            retriable_error_kinds: default_retriable(),
        }
    }

    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::ExponentialBackoff,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
            backoff_multiplier: 2.0,
            retriable_error_kinds: default_retriable(),
        }
    }

    pub fn patient() -> Self {
        Self {
            max_attempts: 5,
            strategy: BackoffStrategy::ExponentialBackoff,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: true,
            backoff_multiplier: 2.0,
            retriable_error_kinds: default_retriable(),
        }
    }

    pub fn network_heavy() -> Self {
        let mut kinds = HashSet::new();
        kinds.insert(ErrorKind::Transient);
        kinds.insert(ErrorKind::Timeout);
        kinds.insert(ErrorKind::InvalidResponse);
        Self {
            max_attempts: 4,
            strategy: BackoffStrategy::ExponentialBackoff,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(45),
            jitter: true,
            backoff_multiplier: 2.0,
            retriable_error_kinds: kinds,
        }
    }
}

fn default_retriable() -> HashSet<ErrorKind> {
    let mut kinds = HashSet::new();
    kinds.insert(ErrorKind::Transient);
    kinds.insert(ErrorKind::Timeout);
    kinds.insert(ErrorKind::RateLimit);
    kinds
}

fn fib(n: u32) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let p = RetryPolicy::fast();
        assert_eq!(p.base_delay_for_attempt(1), p.base_delay_for_attempt(3));
    }

    #[test]
    fn linear_delay_scales_with_attempt() {
        let mut p = RetryPolicy::standard();
        p.strategy = BackoffStrategy::LinearBackoff;
        p.base_delay = Duration::from_secs(1);
        p.max_delay = Duration::from_secs(100);
        assert_eq!(p.base_delay_for_attempt(3), Duration::from_secs(3));
    }

    #[test]
    fn exponential_delay_grows_by_multiplier() {
        let mut p = RetryPolicy::standard();
        p.base_delay = Duration::from_secs(1);
        p.backoff_multiplier = 2.0;
        p.max_delay = Duration::from_secs(1000);
        assert_eq!(p.base_delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.base_delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.base_delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn fibonacci_delay_follows_fib_sequence() {
        let mut p = RetryPolicy::standard();
        p.strategy = BackoffStrategy::FibonacciBackoff;
        p.base_delay = Duration::from_secs(1);
        p.max_delay = Duration::from_secs(1000);
        // fib(1)=fib(2)=1, fib(3)=2, fib(4)=3, fib(5)=5
        assert_eq!(p.base_delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.base_delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.base_delay_for_attempt(3), Duration::from_secs(3));
    }

    #[test]
    fn delay_is_clamped_to_max() {
        let mut p = RetryPolicy::standard();
        p.base_delay = Duration::from_secs(100);
        p.max_delay = Duration::from_secs(10);
        assert_eq!(p.base_delay_for_attempt(5), Duration::from_secs(10));
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let p = RetryPolicy::standard();
        for attempt in 1..=5 {
            let base = p.base_delay_for_attempt(attempt).as_secs_f64();
            for _ in 0..20 {
                let d = p.delay_for_attempt(attempt).as_secs_f64();
                assert!(d >= base * 0.5 - 1e-9);
                assert!(d <= base + 1e-9);
            }
        }
    }

    #[test]
    fn presets_match_documented_profiles() {
        assert_eq!(RetryPolicy::fast().max_attempts, 2);
        assert_eq!(RetryPolicy::standard().max_attempts, 3);
        assert_eq!(RetryPolicy::patient().max_attempts, 5);
        assert_eq!(RetryPolicy::network_heavy().max_attempts, 4);
        assert!(RetryPolicy::network_heavy().is_retriable(ErrorKind::Transient));
        assert!(RetryPolicy::network_heavy().is_retriable(ErrorKind::Timeout));
    }
}
