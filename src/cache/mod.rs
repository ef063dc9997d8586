//! Namespaced cache layer (spec §4.A).
//!
//! A composite key (`namespace:key:sorted(extra_params)`) addresses every
//! entry; two backends (memory, file) implement [`backend::CacheBackend`],
//! and [`manager::CacheManager`] orchestrates primary/fallback lookup,
//! read-through promotion, and smart-TTL. Never on the critical-correctness
//! path: every backend error is logged and treated as a miss/no-op.

pub mod backend;
pub mod file;
pub mod manager;
pub mod memory;
pub mod smart_ttl;

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use backend::{BackendKind, CacheBackend, CacheStats};
pub use manager::CacheManager;

/// Data-type tag driving default TTL selection (spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    MarketData,
    CapitalFlow,
    StockData,
    ConceptData,
    NewsData,
    DividendData,
    Fundamentals,
}

impl DataType {
    /// Default TTL in seconds, per spec §4.A's table.
    pub fn default_ttl_secs(self) -> u64 {
        match self {
            DataType::MarketData => 300,
            DataType::CapitalFlow => 450,
            DataType::StockData => 1800,
            DataType::ConceptData => 1800,
            DataType::NewsData => 900,
            DataType::DividendData => 3600,
            DataType::Fundamentals => 86400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub created_at: u64,
    /// 0 means never expire.
    pub ttl_seconds: u64,
    pub data_type: Option<DataType>,
    pub namespace: String,
}

impl CacheEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        self.ttl_seconds > 0 && now > self.created_at + self.ttl_seconds
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Deterministic composite key: identical logical keys yield identical
/// composite keys regardless of the `extra_params` map's iteration order
/// (spec §4.A, testable property 3), by sorting params into a `BTreeMap`.
pub fn composite_key(
    namespace: &str,
    key: &str,
    extra_params: Option<&std::collections::HashMap<String, String>>,
) -> String {
    let mut out = format!("{namespace}:{key}");
    if let Some(params) = extra_params {
        if !params.is_empty() {
            let sorted: BTreeMap<&String, &String> = params.iter().collect();
            let joined = sorted
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            out.push(':');
            out.push_str(&joined);
        }
    }
    out
}
