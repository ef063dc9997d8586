//! Backend trait shared by the memory and file cache implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CacheEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub backend: String,
    pub entries: usize,
    pub size_bytes: u64,
}

/// A cache backend, safe under concurrent callers (spec §4.A, §5).
///
/// Readers must not block readers; writers may block writers. Every
/// method is fallible at the call site but callers (the manager) treat
/// errors as misses/no-ops per spec's failure semantics — the trait
/// itself still surfaces `anyhow::Result` so backends can log context.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, composite_key: &str) -> anyhow::Result<Option<CacheEntry>>;

    async fn set(&self, entry: CacheEntry) -> anyhow::Result<()>;

    async fn delete(&self, composite_key: &str) -> anyhow::Result<()>;

    async fn clear_namespace(&self, namespace: &str) -> anyhow::Result<()>;

    async fn clear_all(&self) -> anyhow::Result<()>;

    /// `pattern` supports `*` as a glob wildcard over composite keys.
    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>>;

    async fn stats(&self) -> anyhow::Result<CacheStats>;
}

/// Minimal glob match supporting `*` only — no crate in the corpus covers
/// this narrow a need, so it is hand-rolled rather than borrowed.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    fn inner(pat: &[u8], s: &[u8]) -> bool {
        match pat.first() {
            None => s.is_empty(),
            Some(b'*') => {
                inner(&pat[1..], s) || (!s.is_empty() && inner(pat, &s[1..]))
            }
            Some(c) => s.first() == Some(c) && inner(&pat[1..], &s[1..]),
        }
    }
    inner(pattern.as_bytes(), candidate.as_bytes())
}
