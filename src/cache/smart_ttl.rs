//! Smart-TTL: effective TTL computed from recent access frequency within
//! declared bounds (spec §4.A).

use dashmap::DashMap;

use super::backend::glob_match;
use super::now_unix;

const HALF_HOUR_SECS: u64 = 30 * 60;
const ONE_HOUR_SECS: u64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct SmartTtlRule {
    pub glob_pattern: String,
    pub base_ttl: u64,
    pub access_factor: f64,
    pub time_decay: f64,
    pub min_ttl: u64,
    pub max_ttl: u64,
}

/// Tracks per-key access timestamps (last hour only) and evaluates an
/// ordered rule list, first match wins.
pub struct SmartTtlPolicy {
    rules: Vec<SmartTtlRule>,
    accesses: DashMap<String, Vec<u64>>,
}

impl SmartTtlPolicy {
    pub fn new(rules: Vec<SmartTtlRule>) -> Self {
        Self {
            rules,
            accesses: DashMap::new(),
        }
    }

    /// Record an access for `composite_key`, to be counted toward future
    /// TTL computations.
    pub fn record_access(&self, composite_key: &str) {
        let now = now_unix();
        let mut entry = self.accesses.entry(composite_key.to_string()).or_default();
        entry.push(now);
        entry.retain(|&t| now.saturating_sub(t) <= ONE_HOUR_SECS);
    }

    fn accesses_last_30min(&self, composite_key: &str) -> usize {
        let now = now_unix();
        self.accesses
            .get(composite_key)
            .map(|v| v.iter().filter(|&&t| now.saturating_sub(t) <= HALF_HOUR_SECS).count())
            .unwrap_or(0)
    }

    /// Compute the effective TTL for `composite_key`, or `None` if no rule
    /// matches (caller should fall back to the data-type default).
    pub fn effective_ttl(&self, composite_key: &str) -> Option<u64> {
        let rule = self
            .rules
            .iter()
            .find(|r| glob_match(&r.glob_pattern, composite_key))?;

        let accesses = self.accesses_last_30min(composite_key) as f64;
        let multiplier = (accesses * rule.access_factor / 10.0).clamp(0.0, 3.0);
        let effective = (rule.base_ttl as f64 * multiplier) as u64;
        Some(effective.clamp(rule.min_ttl, rule.max_ttl))
    }

    /// Periodic sweep: drop access-timestamp entries whose newest
    /// timestamp is already outside the one-hour retention window.
    pub fn sweep(&self) {
        let now = now_unix();
        self.accesses
            .retain(|_, v| v.iter().any(|&t| now.saturating_sub(t) <= ONE_HOUR_SECS));
    }
}
