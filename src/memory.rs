//! Optional memory collaborator (spec §9 open question resolution):
//! a per-run vector store of past analyses whose sole interaction is
//! "read relevant past analyses before researcher/trader/risk nodes."
//! No concrete vector-store implementation is in scope; [`NoopMemory`]
//! is the default and returns nothing.

use async_trait::async_trait;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn recall(&self, query: &str) -> Vec<String>;
}

pub struct NoopMemory;

#[async_trait]
impl MemoryStore for NoopMemory {
    async fn recall(&self, _query: &str) -> Vec<String> {
        Vec::new()
    }
}
