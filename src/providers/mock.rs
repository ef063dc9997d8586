//! In-memory offline providers (spec §4.D "no live HTTP vendor integration
//! is in scope"). Used by tests and as a drop-in stand-in for real
//! upstream adapters in demo wiring.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::CoreError;
use crate::market::Market;

use super::{Capability, Provider, ProviderArgs};

/// A provider that always returns a fixed value, fails, or is empty —
/// configurable per test. Tracks invocation count for assertions.
pub struct MockProvider {
    name: String,
    market_scope: Vec<Market>,
    offline_capable: bool,
    behavior: Behavior,
    calls: AtomicU32,
}

enum Behavior {
    Value(serde_json::Value),
    Empty,
    Fail(String),
}

impl MockProvider {
    pub fn value(name: &str, market_scope: &[Market], value: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            market_scope: market_scope.to_vec(),
            offline_capable: false,
            behavior: Behavior::Value(value),
            calls: AtomicU32::new(0),
        }
    }

    pub fn empty(name: &str, market_scope: &[Market]) -> Self {
        Self {
            name: name.to_string(),
            market_scope: market_scope.to_vec(),
            offline_capable: false,
            behavior: Behavior::Empty,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(name: &str, market_scope: &[Market], message: &str) -> Self {
        Self {
            name: name.to_string(),
            market_scope: market_scope.to_vec(),
            offline_capable: false,
            behavior: Behavior::Fail(message.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn offline(mut self) -> Self {
        self.offline_capable = true;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn market_scope(&self) -> &[Market] {
        &self.market_scope
    }

    fn offline_capable(&self) -> bool {
        self.offline_capable
    }

    async fn call(&self, _capability: Capability, _args: &ProviderArgs) -> Result<serde_json::Value, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Value(v) => Ok(v.clone()),
            Behavior::Empty => Ok(serde_json::Value::Null),
            Behavior::Fail(msg) => Err(CoreError::Transient(msg.clone())),
        }
    }
}
