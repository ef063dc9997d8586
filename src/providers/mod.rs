//! Multi-source data provider registry (spec §4.D).
//!
//! Grounded on `data/cache.rs` + `data/eodhd.rs`'s fallback chain (local
//! parquet → EODHD API → S3), generalized here to an arbitrary ordered
//! primary/fallback provider list per [`Capability`], each call wrapped
//! through the cache (§4.A) and the robust-call retry/breaker wrapper
//! (§4.B) rather than wired to one specific vendor.

pub mod mock;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheManager, DataType};
use crate::error::CoreError;
use crate::market::{classify, Market};
use crate::retry::breaker::BreakerRegistry;
use crate::retry::monitor::ErrorMonitor;
use crate::retry::robust::robust_call;
use crate::retry::RetryPolicy;

/// A named data-fetch operation (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    StockHistory,
    StockInfo,
    Fundamentals,
    News,
    CapitalFlowRealtime,
    CapitalFlowDaily,
    ConceptList,
    ConceptStocks,
    ConceptCapitalFlow,
    DividendHistory,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::StockHistory => "stock_history",
            Capability::StockInfo => "stock_info",
            Capability::Fundamentals => "fundamentals",
            Capability::News => "news",
            Capability::CapitalFlowRealtime => "capital_flow_realtime",
            Capability::CapitalFlowDaily => "capital_flow_daily",
            Capability::ConceptList => "concept_list",
            Capability::ConceptStocks => "concept_stocks",
            Capability::ConceptCapitalFlow => "concept_capital_flow",
            Capability::DividendHistory => "dividend_history",
        }
    }

    /// Default TTL data-type class for cache storage (spec §4.A, §4.D).
    pub fn default_data_type(self) -> DataType {
        match self {
            Capability::StockHistory | Capability::StockInfo => DataType::StockData,
            Capability::Fundamentals => DataType::Fundamentals,
            Capability::News => DataType::NewsData,
            Capability::CapitalFlowRealtime | Capability::CapitalFlowDaily => DataType::CapitalFlow,
            Capability::ConceptList | Capability::ConceptStocks | Capability::ConceptCapitalFlow => {
                DataType::ConceptData
            }
            Capability::DividendHistory => DataType::DividendData,
        }
    }
}

/// Arguments to a capability call; fields are capability-specific and
/// individually optional (spec §4.D's per-capability signatures).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderArgs {
    pub ticker: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub as_of_date: Option<String>,
    pub concept_code: Option<String>,
    pub days_type: Option<u8>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

impl ProviderArgs {
    /// Flatten present fields into the cache layer's `extra_params` map.
    fn as_cache_params(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        if let Some(v) = &self.start_date {
            m.insert("start_date".to_string(), v.clone());
        }
        if let Some(v) = &self.end_date {
            m.insert("end_date".to_string(), v.clone());
        }
        if let Some(v) = &self.as_of_date {
            m.insert("as_of_date".to_string(), v.clone());
        }
        if let Some(v) = &self.concept_code {
            m.insert("concept_code".to_string(), v.clone());
        }
        if let Some(v) = self.days_type {
            m.insert("days_type".to_string(), v.to_string());
        }
        if let Some(v) = self.start_year {
            m.insert("start_year".to_string(), v.to_string());
        }
        if let Some(v) = self.end_year {
            m.insert("end_year".to_string(), v.to_string());
        }
        m
    }
}

/// An adapter implementing one or more capabilities against a specific
/// upstream data source (spec §4.D, §6 "untrusted upstream adapters").
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn market_scope(&self) -> &[Market];
    /// Whether this provider can be used when `online_tools` is disabled.
    fn offline_capable(&self) -> bool {
        false
    }
    async fn call(&self, capability: Capability, args: &ProviderArgs) -> Result<serde_json::Value, CoreError>;
}

/// Per-capability ordered primary/fallback provider lists plus the shared
/// cache/retry/breaker infrastructure every call goes through.
pub struct ProviderRegistry {
    providers: HashMap<Capability, Vec<Arc<dyn Provider>>>,
    cache: Arc<CacheManager>,
    breakers: Arc<BreakerRegistry>,
    monitor: Arc<ErrorMonitor>,
    retry_policy: RetryPolicy,
}

impl ProviderRegistry {
    pub fn new(cache: Arc<CacheManager>, breakers: Arc<BreakerRegistry>, monitor: Arc<ErrorMonitor>) -> Self {
        Self {
            providers: HashMap::new(),
            cache,
            breakers,
            monitor,
            retry_policy: RetryPolicy::network_heavy(),
        }
    }

    /// Register `provider` as a fallback option for `capability`, in the
    /// order registered (ordering is configuration, not code, per §4.D).
    pub fn register(&mut self, capability: Capability, provider: Arc<dyn Provider>) {
        self.providers.entry(capability).or_default().push(provider);
    }

    /// Dispatch a capability call: classify → filter by market/online-ness
    /// → cache probe → iterate providers under the robust-call wrapper →
    /// cache-store the first success. Never raises; on exhaustion returns
    /// `serde_json::Value::Null` and logs a warning (spec §4.D step 5).
    pub async fn fetch(
        &self,
        capability: Capability,
        args: ProviderArgs,
        online_tools: bool,
    ) -> serde_json::Value {
        let market = match &args.ticker {
            Some(t) => match classify(t) {
                Ok(c) => Some(c.market),
                Err(_) => None,
            },
            None => None,
        };
        let normalized_ticker = match &args.ticker {
            Some(t) => classify(t).map(|c| c.normalized_ticker).unwrap_or_else(|_| t.clone()),
            None => "global".to_string(),
        };

        let candidates: Vec<Arc<dyn Provider>> = self
            .providers
            .get(&capability)
            .into_iter()
            .flatten()
            .filter(|p| match market {
                Some(m) => p.market_scope().contains(&m),
                None => true,
            })
            .filter(|p| online_tools || p.offline_capable())
            .cloned()
            .collect();

        let cache_params = args.as_cache_params();
        if let Some(hit) = self
            .cache
            .get(capability.name(), &normalized_ticker, Some(&cache_params))
            .await
        {
            return hit;
        }

        let mut last_error: Option<CoreError> = None;
        for provider in &candidates {
            let function = format!("provider:{}:{}", provider.name(), capability.name());
            let breaker = self.breakers.get_or_create(&function);
            let result = robust_call(&function, &self.retry_policy, &breaker, &self.monitor, || {
                provider.call(capability, &args)
            })
            .await;

            match result {
                Ok(value) if !is_empty_payload(&value) => {
                    self.cache
                        .set(
                            capability.name(),
                            &normalized_ticker,
                            value.clone(),
                            capability.default_data_type(),
                            None,
                            Some(&cache_params),
                        )
                        .await;
                    return value;
                }
                Ok(_) => continue,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            }
        }

        if let Some(e) = last_error {
            tracing::warn!(
                capability = capability.name(),
                ticker = %normalized_ticker,
                error = %e,
                "all providers exhausted"
            );
        } else {
            tracing::warn!(
                capability = capability.name(),
                ticker = %normalized_ticker,
                "no provider configured for this market/capability"
            );
        }
        serde_json::Value::Null
    }
}

fn is_empty_payload(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => true,
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryBackend;
    use crate::retry::breaker::BreakerConfig;
    use mock::MockProvider;

    fn fresh_registry() -> ProviderRegistry {
        let cache = Arc::new(CacheManager::new(Arc::new(MemoryBackend::new(100)), vec![]));
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        let monitor = Arc::new(ErrorMonitor::new(100));
        ProviderRegistry::new(cache, breakers, monitor)
    }

    #[tokio::test]
    async fn first_non_empty_provider_wins_and_is_cached() {
        let mut registry = fresh_registry();
        registry.register(
            Capability::StockHistory,
            Arc::new(MockProvider::empty("primary", &[Market::Us])),
        );
        registry.register(
            Capability::StockHistory,
            Arc::new(MockProvider::value("secondary", &[Market::Us], serde_json::json!([1, 2, 3]))),
        );

        let args = ProviderArgs {
            ticker: Some("AAPL".to_string()),
            ..Default::default()
        };
        let result = registry.fetch(Capability::StockHistory, args, true).await;
        assert_eq!(result, serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn out_of_market_provider_is_filtered_out() {
        let mut registry = fresh_registry();
        registry.register(
            Capability::StockHistory,
            Arc::new(MockProvider::value("cn-only", &[Market::CnA], serde_json::json!([9]))),
        );

        let args = ProviderArgs {
            ticker: Some("AAPL".to_string()),
            ..Default::default()
        };
        let result = registry.fetch(Capability::StockHistory, args, true).await;
        assert!(result.is_null());
    }

    #[tokio::test]
    async fn offline_tools_disabled_skips_non_offline_providers() {
        let mut registry = fresh_registry();
        registry.register(
            Capability::News,
            Arc::new(MockProvider::value("online-only", &[Market::Us], serde_json::json!([1]))),
        );
        let args = ProviderArgs {
            ticker: Some("AAPL".to_string()),
            ..Default::default()
        };
        let result = registry.fetch(Capability::News, args, false).await;
        assert!(result.is_null());
    }

    #[tokio::test]
    async fn repeated_fetch_hits_cache_without_calling_provider_again() {
        let mut registry = fresh_registry();
        let provider = Arc::new(MockProvider::value("p", &[Market::Us], serde_json::json!([1])));
        registry.register(Capability::StockInfo, provider.clone());

        let args = ProviderArgs {
            ticker: Some("AAPL".to_string()),
            ..Default::default()
        };
        registry.fetch(Capability::StockInfo, args.clone(), true).await;
        registry.fetch(Capability::StockInfo, args, true).await;
        assert_eq!(provider.call_count(), 1);
    }
}
