//! In-memory LRU-bounded cache backend (spec §4.A).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{glob_match, BackendKind, CacheBackend, CacheStats};
use super::{now_unix, CacheEntry};

/// `max_size`-bounded, promote-on-access LRU. The recency list is guarded
/// by a plain `std::sync::Mutex` — only ever held across a `Vec`/`VecDeque`
/// mutation, never across an `.await`, per spec §5's "no component may
/// hold a lock across [a suspension point]".
pub struct MemoryBackend {
    max_size: usize,
    entries: DashMap<String, CacheEntry>,
    recency: Mutex<VecDeque<String>>,
}

impl MemoryBackend {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            entries: DashMap::new(),
            recency: Mutex::new(VecDeque::new()),
        }
    }

    fn touch(&self, key: &str) {
        let mut recency = self.recency.lock().unwrap();
        if let Some(pos) = recency.iter().position(|k| k == key) {
            recency.remove(pos);
        }
        recency.push_back(key.to_string());
    }

    fn untrack(&self, key: &str) {
        let mut recency = self.recency.lock().unwrap();
        if let Some(pos) = recency.iter().position(|k| k == key) {
            recency.remove(pos);
        }
    }

    /// Evict least-recently-used entries until under `max_size`.
    fn evict_if_needed(&self) {
        while self.entries.len() > self.max_size {
            let victim = {
                let mut recency = self.recency.lock().unwrap();
                recency.pop_front()
            };
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, composite_key: &str) -> anyhow::Result<Option<CacheEntry>> {
        let Some(entry) = self.entries.get(composite_key).map(|e| e.clone()) else {
            return Ok(None);
        };
        if entry.is_expired(now_unix()) {
            self.entries.remove(composite_key);
            self.untrack(composite_key);
            return Ok(None);
        }
        self.touch(composite_key);
        Ok(Some(entry))
    }

    async fn set(&self, entry: CacheEntry) -> anyhow::Result<()> {
        let key = composite_key_of(&entry);
        self.entries.insert(key.clone(), entry);
        self.touch(&key);
        self.evict_if_needed();
        Ok(())
    }

    async fn delete(&self, composite_key: &str) -> anyhow::Result<()> {
        self.entries.remove(composite_key);
        self.untrack(composite_key);
        Ok(())
    }

    async fn clear_namespace(&self, namespace: &str) -> anyhow::Result<()> {
        let prefix = format!("{namespace}:");
        let victims: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(&prefix))
            .collect();
        for k in victims {
            self.entries.remove(&k);
            self.untrack(&k);
        }
        Ok(())
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        self.entries.clear();
        self.recency.lock().unwrap().clear();
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| glob_match(pattern, k))
            .collect())
    }

    async fn stats(&self) -> anyhow::Result<CacheStats> {
        let size_bytes = self
            .entries
            .iter()
            .map(|e| serde_json::to_vec(e.value()).map(|v| v.len() as u64).unwrap_or(0))
            .sum();
        Ok(CacheStats {
            backend: "memory".to_string(),
            entries: self.entries.len(),
            size_bytes,
        })
    }
}

fn composite_key_of(entry: &CacheEntry) -> String {
    entry.key.clone()
}

pub const KIND: BackendKind = BackendKind::Memory;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, ttl: u64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            payload: serde_json::json!(1),
            created_at: now_unix(),
            ttl_seconds: ttl,
            data_type: None,
            namespace: "ns".to_string(),
        }
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let backend = MemoryBackend::new(2);
        backend.set(entry("ns:a", 0)).await.unwrap();
        backend.set(entry("ns:b", 0)).await.unwrap();
        backend.get("ns:a").await.unwrap();
        backend.set(entry("ns:c", 0)).await.unwrap();

        assert!(backend.get("ns:b").await.unwrap().is_none());
        assert!(backend.get("ns:a").await.unwrap().is_some());
        assert!(backend.get("ns:c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn never_exceeds_max_size() {
        let backend = MemoryBackend::new(3);
        for i in 0..10 {
            backend.set(entry(&format!("ns:{i}"), 0)).await.unwrap();
        }
        assert!(backend.entries.len() <= 3);
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let backend = MemoryBackend::new(10);
        backend.set(entry("ns:a", 0)).await.unwrap();
        assert!(backend.get("ns:a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_removed_on_get() {
        let backend = MemoryBackend::new(10);
        let mut e = entry("ns:a", 1);
        e.created_at = now_unix() - 5;
        backend.set(e).await.unwrap();
        assert!(backend.get("ns:a").await.unwrap().is_none());
        assert_eq!(backend.entries.len(), 0);
    }
}
