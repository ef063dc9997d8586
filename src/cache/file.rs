//! On-disk cache backend (spec §4.A, §6 "Persisted state").
//!
//! One blob per entry, filename = hex blake3 hash of the composite key; a
//! single index file maps composite key → `{blob_filename, created_at,
//! ttl_seconds}`, rewritten atomically (temp file + rename). Grounded on
//! `data/cache.rs`'s `CachedStore` (local-path resolution, env-driven
//! construction) generalized from a single Parquet-per-symbol layout into
//! an arbitrary-key blob store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::backend::{glob_match, BackendKind, CacheBackend, CacheStats};
use super::{now_unix, CacheEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    blob_filename: String,
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
    namespace: String,
}

type Index = HashMap<String, IndexRecord>;

pub struct FileBackend {
    dir: PathBuf,
    index: RwLock<Index>,
}

impl FileBackend {
    pub async fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let backend = Self {
            dir,
            index: RwLock::new(Index::new()),
        };
        backend.repair().await?;
        Ok(backend)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn blob_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    fn blob_filename(composite_key: &str) -> String {
        format!("{}.blob", blake3::hash(composite_key.as_bytes()).to_hex())
    }

    /// Load the index from disk, drop entries whose blob is missing, and
    /// remove blobs with no index entry.
    async fn repair(&self) -> anyhow::Result<()> {
        let loaded: Index = match tokio::fs::read(self.index_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Index::new(),
        };

        let mut kept = Index::new();
        for (k, rec) in loaded {
            if self.blob_path(&rec.blob_filename).exists() {
                kept.insert(k, rec);
            }
        }

        if let Ok(mut read_dir) = tokio::fs::read_dir(&self.dir).await {
            let known: std::collections::HashSet<&str> =
                kept.values().map(|r| r.blob_filename.as_str()).collect();
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.ends_with(".blob") && !known.contains(name.as_ref()) {
                    let _ = tokio::fs::remove_file(entry.path()).await;
                }
            }
        }

        *self.index.write().await = kept;
        Ok(())
    }

    async fn persist_index(&self, index: &Index) -> anyhow::Result<()> {
        write_atomic(&self.index_path(), &serde_json::to_vec_pretty(index)?).await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn get(&self, composite_key: &str) -> anyhow::Result<Option<CacheEntry>> {
        let rec = { self.index.read().await.get(composite_key).cloned() };
        let Some(rec) = rec else {
            return Ok(None);
        };

        let entry = CacheEntry {
            key: composite_key.to_string(),
            created_at: rec.created_at.timestamp() as u64,
            ttl_seconds: rec.ttl_seconds,
            namespace: rec.namespace.clone(),
            data_type: None,
            payload: match tokio::fs::read(self.blob_path(&rec.blob_filename)).await {
                Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null),
                Err(_) => return Ok(None),
            },
        };

        if entry.is_expired(now_unix()) {
            self.delete(composite_key).await.ok();
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn set(&self, entry: CacheEntry) -> anyhow::Result<()> {
        let filename = Self::blob_filename(&entry.key);
        let bytes = serde_json::to_vec(&entry.payload)?;
        tokio::fs::write(self.blob_path(&filename), bytes).await?;

        let mut index = self.index.write().await;
        index.insert(
            entry.key.clone(),
            IndexRecord {
                blob_filename: filename,
                created_at: DateTime::<Utc>::from_timestamp(entry.created_at as i64, 0)
                    .unwrap_or_else(Utc::now),
                ttl_seconds: entry.ttl_seconds,
                namespace: entry.namespace,
            },
        );
        self.persist_index(&index).await
    }

    async fn delete(&self, composite_key: &str) -> anyhow::Result<()> {
        let mut index = self.index.write().await;
        if let Some(rec) = index.remove(composite_key) {
            let _ = tokio::fs::remove_file(self.blob_path(&rec.blob_filename)).await;
            self.persist_index(&index).await?;
        }
        Ok(())
    }

    async fn clear_namespace(&self, namespace: &str) -> anyhow::Result<()> {
        let victims: Vec<String> = {
            let index = self.index.read().await;
            index
                .iter()
                .filter(|(_, rec)| rec.namespace == namespace)
                .map(|(k, _)| k.clone())
                .collect()
        };
        for k in victims {
            self.delete(&k).await?;
        }
        Ok(())
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        let keys: Vec<String> = self.index.read().await.keys().cloned().collect();
        for k in keys {
            self.delete(&k).await?;
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .index
            .read()
            .await
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> anyhow::Result<CacheStats> {
        let index = self.index.read().await;
        let mut size_bytes = 0u64;
        for rec in index.values() {
            if let Ok(meta) = tokio::fs::metadata(self.blob_path(&rec.blob_filename)).await {
                size_bytes += meta.len();
            }
        }
        Ok(CacheStats {
            backend: "file".to_string(),
            entries: index.len(),
            size_bytes,
        })
    }
}

pub const KIND: BackendKind = BackendKind::File;
