//! Bounded in-memory error history and per-`(function, kind)` counters
//! (spec §4.B "error observability").

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::ErrorKind;

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub function: String,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

pub struct ErrorMonitor {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
    counts: DashMap<(String, ErrorKind), u64>,
}

impl ErrorMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            counts: DashMap::new(),
        }
    }

    pub fn record(&self, function: &str, kind: ErrorKind, message: impl Into<String>) {
        tracing::warn!(function, ?kind, "call failed");
        *self
            .counts
            .entry((function.to_string(), kind))
            .or_insert(0) += 1;

        let mut records = self.records.lock().unwrap();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(ErrorRecord {
            function: function.to_string(),
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn count_for(&self, function: &str, kind: ErrorKind) -> u64 {
        self.counts
            .get(&(function.to_string(), kind))
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        let records = self.records.lock().unwrap();
        records.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for ErrorMonitor {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_queue_drops_oldest() {
        let monitor = ErrorMonitor::new(2);
        monitor.record("f", ErrorKind::Transient, "a");
        monitor.record("f", ErrorKind::Transient, "b");
        monitor.record("f", ErrorKind::Transient, "c");
        let recent = monitor.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "c");
        assert_eq!(recent[1].message, "b");
    }

    #[test]
    fn counts_aggregate_by_function_and_kind() {
        let monitor = ErrorMonitor::new(10);
        monitor.record("f", ErrorKind::Timeout, "x");
        monitor.record("f", ErrorKind::Timeout, "y");
        monitor.record("f", ErrorKind::Transient, "z");
        monitor.record("g", ErrorKind::Timeout, "w");

        assert_eq!(monitor.count_for("f", ErrorKind::Timeout), 2);
        assert_eq!(monitor.count_for("f", ErrorKind::Transient), 1);
        assert_eq!(monitor.count_for("g", ErrorKind::Timeout), 1);
        assert_eq!(monitor.count_for("g", ErrorKind::Transient), 0);
    }
}
