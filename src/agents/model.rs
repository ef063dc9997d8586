//! External model-client contract (spec §6). The model itself — chat
//! completion, tool-schema binding, token accounting — is out of scope;
//! this crate only fixes the request/response shape it expects.

use async_trait::async_trait;

use crate::config::ModelProfile;
use crate::error::CoreError;
use crate::state::{Message, ToolCall};

#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A model handle already bound to a toolset (spec §6 `bind_tools(toolset)
/// → bound-invoker`). Some model families share tool-binding state across
/// invocations of the same handle; per spec §4.F's model-substitution
/// policy, callers construct a fresh handle for each analyst invocation
/// via [`ModelFactory::bind_tools`] rather than reusing one.
#[async_trait]
pub trait BoundModel: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, CoreError>;
}

/// Produces fresh, independently-bound model handles (spec §6, §9 open
/// question on concurrent tool-binding safety). `profile` is the
/// `research_depth`-derived quick/deep selection (spec §6): implementations
/// route to a cheaper or more capable model family accordingly.
pub trait ModelFactory: Send + Sync {
    fn bind_tools(&self, tool_names: &[String], profile: ModelProfile) -> Box<dyn BoundModel>;
}
