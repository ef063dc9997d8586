//! Tool registry and dispatcher (spec §4.E).
//!
//! Grounded on `server.rs`'s `#[tool]`-annotated methods and
//! `garde`-validated parameter structs, generalized from "tool exposed to
//! an external MCP client" to "tool descriptor invoked directly by our
//! own dispatcher on behalf of an external model client" — the `rmcp`
//! server-protocol machinery itself is dropped (see DESIGN.md).

pub mod builtin;
pub mod dispatcher;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::state::AnalystRole;

pub use dispatcher::dispatch;

/// The declared type of a tool argument, consulted by the dispatcher for
/// presence/ticker validation ahead of invoking the handler (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Number,
    Boolean,
    Ticker,
}

#[derive(Debug, Clone)]
pub struct ToolArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub description: String,
}

impl ToolArgSpec {
    pub fn required(name: &str, kind: ArgKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, kind: ArgKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
        }
    }
}

/// A registered tool's handler body. Each implementation owns its own
/// `garde`/`schemars`-annotated params struct and deserializes `args`
/// into it internally — the registry only carries the coarse arg_spec
/// used for dispatch-time presence/ticker checks.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError>;
}

pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub arg_spec: Vec<ToolArgSpec>,
    /// Whether this handler may run concurrently with others in the same
    /// dispatch batch (spec §4.E, §5).
    pub side_effect_free: bool,
    pub timeout: Duration,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: &str,
        description: &str,
        arg_spec: Vec<ToolArgSpec>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            arg_spec,
            side_effect_free: true,
            timeout: Duration::from_secs(60),
            handler,
        }
    }
}

/// Name → descriptor map, plus the per-role toolset subsets (spec §4.E).
#[derive(Default)]
pub struct ToolRegistry {
    descriptors: HashMap<String, Arc<ToolDescriptor>>,
    toolsets: HashMap<AnalystRole, Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.descriptors.insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn assign_to_role(&mut self, role: AnalystRole, tool_name: &str) {
        self.toolsets.entry(role).or_default().push(tool_name.to_string());
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.descriptors.get(name).cloned()
    }

    pub fn toolset_for(&self, role: AnalystRole) -> &[String] {
        self.toolsets.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The tool a role invokes during forced tool invocation (spec §4.F
    /// step 5): the first tool registered for that role.
    pub fn primary_tool_for(&self, role: AnalystRole) -> Option<&str> {
        self.toolset_for(role).first().map(String::as_str)
    }
}
