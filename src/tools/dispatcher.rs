//! Dispatch algorithm for a batch of model-emitted tool calls (spec §4.E).
//!
//! Unknown tools, validation failures, and timeouts are all answered as
//! diagnostic `ToolMessage`s rather than raised — the dispatcher never
//! fails a model turn.

use futures::future::join_all;

use crate::market::classify;
use crate::state::{Message, ToolCall};

use super::{ArgKind, ToolDescriptor, ToolRegistry};

/// Dispatch `tool_calls` against `registry`, returning one `Message` per
/// call in the same order, each tagged with the matching `tool_call_id`
/// (spec §3 invariant, §8 property 8). Runs concurrently only when every
/// descriptor in the batch is flagged `side_effect_free`; sequential by
/// default (spec §4.E, §5).
pub async fn dispatch(registry: &ToolRegistry, tool_calls: &[ToolCall]) -> Vec<Message> {
    let batch_is_concurrent_safe = !tool_calls.is_empty()
        && tool_calls
            .iter()
            .all(|tc| registry.get(&tc.name).is_some_and(|d| d.side_effect_free));

    if batch_is_concurrent_safe {
        join_all(tool_calls.iter().map(|tc| dispatch_one(registry, tc))).await
    } else {
        let mut out = Vec::with_capacity(tool_calls.len());
        for tc in tool_calls {
            out.push(dispatch_one(registry, tc).await);
        }
        out
    }
}

async fn dispatch_one(registry: &ToolRegistry, tc: &ToolCall) -> Message {
    let Some(descriptor) = registry.get(&tc.name) else {
        return Message::tool(tc.id.clone(), format!("unknown tool: {}", tc.name));
    };

    if let Err(diagnostic) = validate_args(&descriptor, tc) {
        return Message::tool(tc.id.clone(), diagnostic);
    }

    let call = descriptor.handler.call(tc.args.clone());
    match tokio::time::timeout(descriptor.timeout, call).await {
        Ok(Ok(result)) => Message::tool(tc.id.clone(), result),
        Ok(Err(e)) => Message::tool(tc.id.clone(), format!("tool error: {e}")),
        Err(_) => Message::tool(tc.id.clone(), format!("tool '{}' timed out", tc.name)),
    }
}

fn validate_args(descriptor: &ToolDescriptor, tc: &ToolCall) -> Result<(), String> {
    for spec in &descriptor.arg_spec {
        let value = tc.args.get(&spec.name);
        if spec.required && value.is_none() {
            return Err(format!(
                "tool '{}': missing required argument '{}'",
                tc.name, spec.name
            ));
        }
        if spec.kind == ArgKind::Ticker {
            if let Some(serde_json::Value::String(ticker)) = value {
                if classify(ticker).is_err() {
                    return Err(format!(
                        "tool '{}': invalid ticker '{ticker}' for argument '{}'",
                        tc.name, spec.name
                    ));
                }
            }
        }
    }
    Ok(())
}
