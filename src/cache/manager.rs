//! Orchestrates a primary backend and an ordered fallback list (spec §4.A).

use std::collections::HashMap;
use std::sync::Arc;

use super::backend::{CacheBackend, CacheStats};
use super::smart_ttl::SmartTtlPolicy;
use super::{composite_key, now_unix, CacheEntry, DataType};

pub struct CacheManager {
    primary: Arc<dyn CacheBackend>,
    fallbacks: Vec<Arc<dyn CacheBackend>>,
    smart_ttl: Option<SmartTtlPolicy>,
}

impl CacheManager {
    pub fn new(primary: Arc<dyn CacheBackend>, fallbacks: Vec<Arc<dyn CacheBackend>>) -> Self {
        Self {
            primary,
            fallbacks,
            smart_ttl: None,
        }
    }

    pub fn with_smart_ttl(mut self, policy: SmartTtlPolicy) -> Self {
        self.smart_ttl = Some(policy);
        self
    }

    /// `get` tries primary; on miss, tries fallbacks in order; on a
    /// fallback hit, writes the value back into the primary (read-through
    /// promotion). Any backend error is treated as a miss and logged —
    /// the cache is never on the critical-correctness path.
    pub async fn get(
        &self,
        namespace: &str,
        key: &str,
        extra_params: Option<&HashMap<String, String>>,
    ) -> Option<serde_json::Value> {
        let ck = composite_key(namespace, key, extra_params);
        if let Some(policy) = &self.smart_ttl {
            policy.record_access(&ck);
        }

        match self.primary.get(&ck).await {
            Ok(Some(entry)) => return Some(entry.payload),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %ck, error = %e, "cache primary get failed, treating as miss"),
        }

        for fallback in &self.fallbacks {
            match fallback.get(&ck).await {
                Ok(Some(entry)) => {
                    if let Err(e) = self.primary.set(entry.clone()).await {
                        tracing::warn!(key = %ck, error = %e, "failed to promote cache entry to primary");
                    }
                    return Some(entry.payload);
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %ck, error = %e, "cache fallback get failed, trying next");
                    continue;
                }
            }
        }
        None
    }

    /// `set` writes only to primary; computes TTL from `data_type` unless
    /// `ttl_seconds` is given, consulting smart-TTL rules first.
    pub async fn set(
        &self,
        namespace: &str,
        key: &str,
        payload: serde_json::Value,
        data_type: DataType,
        ttl_seconds: Option<u64>,
        extra_params: Option<&HashMap<String, String>>,
    ) {
        let ck = composite_key(namespace, key, extra_params);
        let ttl = ttl_seconds.unwrap_or_else(|| {
            self.smart_ttl
                .as_ref()
                .and_then(|p| p.effective_ttl(&ck))
                .unwrap_or_else(|| data_type.default_ttl_secs())
        });

        let entry = CacheEntry {
            key: ck.clone(),
            payload,
            created_at: now_unix(),
            ttl_seconds: ttl,
            data_type: Some(data_type),
            namespace: namespace.to_string(),
        };

        if let Err(e) = self.primary.set(entry).await {
            tracing::warn!(key = %ck, error = %e, "cache set failed, ignoring");
        }
    }

    /// `delete` broadcasts to all backends.
    pub async fn delete(&self, namespace: &str, key: &str, extra_params: Option<&HashMap<String, String>>) {
        let ck = composite_key(namespace, key, extra_params);
        if let Err(e) = self.primary.delete(&ck).await {
            tracing::warn!(key = %ck, error = %e, "cache delete (primary) failed");
        }
        for fallback in &self.fallbacks {
            if let Err(e) = fallback.delete(&ck).await {
                tracing::warn!(key = %ck, error = %e, "cache delete (fallback) failed");
            }
        }
    }

    pub async fn clear_namespace(&self, namespace: &str) {
        if let Err(e) = self.primary.clear_namespace(namespace).await {
            tracing::warn!(namespace, error = %e, "cache clear_namespace (primary) failed");
        }
        for fallback in &self.fallbacks {
            let _ = fallback.clear_namespace(namespace).await;
        }
    }

    pub async fn clear_all(&self) {
        let _ = self.primary.clear_all().await;
        for fallback in &self.fallbacks {
            let _ = fallback.clear_all().await;
        }
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        self.primary.keys(pattern).await.unwrap_or_default()
    }

    pub async fn stats(&self) -> CacheStats {
        self.primary.stats().await.unwrap_or(CacheStats {
            backend: "unknown".to_string(),
            entries: 0,
            size_bytes: 0,
        })
    }
}
