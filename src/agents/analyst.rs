//! One analyst role's node contract (spec §4.F), supplemented by
//! `tradingagents/agents/analysts/*.py` and `agent_utils.py`'s tool-loop
//! shape: build prompt → invoke model → tool-call loop → forced-invocation
//! fallback → write report slot. Prompt text itself is out of scope (spec
//! §1), so role system-prompt construction is a small template function.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::ModelProfile;
use crate::market::{classify, Classification};
use crate::state::{AgentState, AnalystRole, Message, ToolCall};
use crate::tools::{dispatch, ToolDescriptor, ToolRegistry};

use super::model::ModelFactory;

pub(crate) const DEFAULT_ITERATION_CAP: u32 = 10;

pub struct AnalystNode {
    role: AnalystRole,
    model_factory: Arc<dyn ModelFactory>,
    tools: Arc<ToolRegistry>,
    profile: ModelProfile,
    iteration_cap: u32,
}

impl AnalystNode {
    pub fn new(role: AnalystRole, model_factory: Arc<dyn ModelFactory>, tools: Arc<ToolRegistry>, profile: ModelProfile) -> Self {
        Self {
            role,
            model_factory,
            tools,
            profile,
            iteration_cap: DEFAULT_ITERATION_CAP,
        }
    }

    pub fn role(&self) -> AnalystRole {
        self.role
    }

    /// Exposes this node's collaborators so the sequential topology can
    /// build the `M_i`/`T_i`/`C_i` decomposition (spec.md §4.H.1) out of
    /// the same per-role wiring `build_parallel_graph` uses directly.
    pub(crate) fn model_factory(&self) -> Arc<dyn ModelFactory> {
        self.model_factory.clone()
    }

    pub(crate) fn tools(&self) -> Arc<ToolRegistry> {
        self.tools.clone()
    }

    pub(crate) fn profile(&self) -> ModelProfile {
        self.profile
    }

    pub(crate) fn iteration_cap(&self) -> u32 {
        self.iteration_cap
    }

    /// `(state) → state′` (spec §4.F). Never raises: classifier failures,
    /// model errors, and tool failures all degrade into a report-slot
    /// error string so sibling analysts (or the sequential successor) can
    /// proceed (spec §4.F "failure isolation").
    pub async fn run(&self, mut state: AgentState) -> AgentState {
        let classification = match classify(&state.company_of_interest) {
            Ok(c) => c,
            Err(e) => {
                self.fail(&mut state, &e.to_string());
                return state;
            }
        };

        let toolset = self.tools.toolset_for(self.role).to_vec();
        let system_prompt = build_system_prompt(self.role, &state.company_of_interest, &classification, &toolset);
        let model = self.model_factory.bind_tools(&toolset, self.profile);

        let mut turn_messages = vec![Message::system(system_prompt)];
        turn_messages.extend(state.messages.iter().cloned());

        let mut iterations = 0u32;
        let mut forced_invocation_done = false;
        let mut last_content = String::new();

        loop {
            let response = match model.invoke(&turn_messages).await {
                Ok(r) => r,
                Err(e) => {
                    self.fail(&mut state, &e.to_string());
                    return state;
                }
            };

            if !response.has_tool_calls() {
                if iterations == 0 && !forced_invocation_done {
                    let primary = self
                        .tools
                        .primary_tool_for(self.role)
                        .and_then(|name| self.tools.get(name));
                    if let Some(primary) = primary {
                        let call = forced_tool_call(&primary, &state);
                        turn_messages.push(Message::ai_with_tool_calls(String::new(), vec![call.clone()]));
                        warn_on_ticker_mismatch(self.role, &call, &state);
                        let tool_messages = dispatch(&self.tools, std::slice::from_ref(&call)).await;
                        turn_messages.extend(tool_messages.clone());
                        state.messages.extend(tool_messages);
                        forced_invocation_done = true;
                        iterations += 1;
                        continue;
                    }
                }
                last_content = response.content.clone();
                state.messages.push(Message::ai(response.content).named(self.role.name()));
                break;
            }

            for tc in &response.tool_calls {
                warn_on_ticker_mismatch(self.role, tc, &state);
            }

            turn_messages.push(Message::ai_with_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            state.messages.push(
                Message::ai_with_tool_calls(response.content.clone(), response.tool_calls.clone())
                    .named(self.role.name()),
            );

            let tool_messages = dispatch(&self.tools, &response.tool_calls).await;
            turn_messages.extend(tool_messages.clone());
            state.messages.extend(tool_messages);

            iterations += 1;
            if iterations >= self.iteration_cap {
                last_content = response.content;
                break;
            }
        }

        *state.report_slot_mut(self.role) = last_content;
        state.sender = self.role.name().to_string();
        state
    }

    fn fail(&self, state: &mut AgentState, reason: &str) {
        fail_report(state, self.role, reason);
    }
}

/// Shared by [`AnalystNode::run`] and the sequential topology's `M_i` node:
/// degrade a report slot to an error string without raising (spec §4.F
/// "failure isolation").
pub(crate) fn fail_report(state: &mut AgentState, role: AnalystRole, reason: &str) {
    *state.report_slot_mut(role) = format!("{} analysis failed: {reason}", role.name());
    state.sender = role.name().to_string();
}

pub(crate) fn warn_on_ticker_mismatch(role: AnalystRole, tc: &ToolCall, state: &AgentState) {
    if let Some(requested) = tc.args.get("ticker").and_then(Value::as_str) {
        if requested != state.company_of_interest {
            tracing::warn!(
                role = role.name(),
                requested,
                expected = %state.company_of_interest,
                "tool call ticker differs from company_of_interest; honoring request"
            );
        }
    }
}

/// Designated-tool + synthesized-args forced invocation (spec §4.F step 5,
/// §9 "not a guessing mechanism" — ticker and dates are the role's
/// declared contract, not inferred).
pub(crate) fn forced_tool_call(tool: &ToolDescriptor, state: &AgentState) -> ToolCall {
    let mut args = Map::new();
    let trade_date = NaiveDate::parse_from_str(&state.trade_date, "%Y-%m-%d").ok();

    for spec in &tool.arg_spec {
        match spec.name.as_str() {
            "ticker" => {
                args.insert("ticker".to_string(), Value::String(state.company_of_interest.clone()));
            }
            "as_of_date" | "end_date" => {
                args.insert(spec.name.clone(), Value::String(state.trade_date.clone()));
            }
            "start_date" => {
                let start = trade_date
                    .map(|d| (d - ChronoDuration::days(30)).to_string())
                    .unwrap_or_else(|| state.trade_date.clone());
                args.insert(spec.name.clone(), Value::String(start));
            }
            _ => {}
        }
    }

    ToolCall {
        id: format!("forced-{}", Uuid::new_v4()),
        name: tool.name.clone(),
        args,
    }
}

pub(crate) fn build_system_prompt(role: AnalystRole, ticker: &str, classification: &Classification, tool_names: &[String]) -> String {
    format!(
        "You are the {} analyst for {} ({:?}, currency {}). Available tools: {}.",
        role.name(),
        ticker,
        classification.market,
        classification.currency_code,
        tool_names.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::model::{BoundModel, ModelResponse};
    use crate::error::CoreError;
    use crate::tools::{ArgKind, ToolArgSpec, ToolDescriptor, ToolHandler};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubModel {
        responses: std::sync::Mutex<Vec<ModelResponse>>,
    }

    #[async_trait]
    impl BoundModel for StubModel {
        async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, CoreError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(ModelResponse::default())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    struct StubFactory {
        responses: Vec<ModelResponse>,
    }

    impl ModelFactory for StubFactory {
        fn bind_tools(&self, _tool_names: &[String], _profile: ModelProfile) -> Box<dyn BoundModel> {
            Box::new(StubModel {
                responses: std::sync::Mutex::new(self.responses.clone()),
            })
        }
    }

    struct EchoHandler(Arc<AtomicU32>);

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn call(&self, _args: Map<String, Value>) -> Result<String, CoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("{}".to_string())
        }
    }

    fn registry_with_market_tool(calls: Arc<AtomicU32>) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(ToolDescriptor::new(
            "get_stock_market_data_unified",
            "d",
            vec![
                ToolArgSpec::required("ticker", ArgKind::Ticker, "d"),
                ToolArgSpec::required("start_date", ArgKind::String, "d"),
                ToolArgSpec::required("end_date", ArgKind::String, "d"),
            ],
            Arc::new(EchoHandler(calls)),
        ));
        tools.assign_to_role(AnalystRole::Market, "get_stock_market_data_unified");
        tools
    }

    #[tokio::test]
    async fn no_tool_calls_writes_content_straight_to_report_slot() {
        let calls = Arc::new(AtomicU32::new(0));
        let factory: Arc<dyn ModelFactory> = Arc::new(StubFactory {
            responses: vec![ModelResponse {
                content: "FINAL TRANSACTION PROPOSAL: **HOLD**".to_string(),
                tool_calls: vec![],
            }],
        });
        let tools = Arc::new(registry_with_market_tool(calls.clone()));
        let node = AnalystNode::new(AnalystRole::Market, factory, tools, ModelProfile::Quick);

        let state = AgentState::new("run1", "AAPL", "2024-05-10");
        let out = node.run(state).await;

        assert_eq!(out.market_report, "FINAL TRANSACTION PROPOSAL: **HOLD**");
        assert_eq!(out.sender, "market");
        // forced invocation should have fired since first response had no tool calls
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tool_call_then_final_text_populates_report_and_tool_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let factory: Arc<dyn ModelFactory> = Arc::new(StubFactory {
            responses: vec![
                ModelResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        id: "tc1".to_string(),
                        name: "get_stock_market_data_unified".to_string(),
                        args: serde_json::json!({"ticker": "AAPL", "start_date": "2024-04-01", "end_date": "2024-05-10"})
                            .as_object()
                            .unwrap()
                            .clone(),
                    }],
                },
                ModelResponse {
                    content: "FINAL TRANSACTION PROPOSAL: **BUY**".to_string(),
                    tool_calls: vec![],
                },
            ],
        });
        let tools = Arc::new(registry_with_market_tool(calls.clone()));
        let node = AnalystNode::new(AnalystRole::Market, factory, tools, ModelProfile::Quick);

        let state = AgentState::new("run1", "AAPL", "2024-05-10");
        let out = node.run(state).await;

        assert_eq!(out.market_report, "FINAL TRANSACTION PROPOSAL: **BUY**");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let tool_msgs: Vec<_> = out
            .messages
            .iter()
            .filter(|m| m.tool_call_id.as_deref() == Some("tc1"))
            .collect();
        assert_eq!(tool_msgs.len(), 1);
    }

    #[tokio::test]
    async fn invalid_ticker_degrades_report_without_invoking_model() {
        let calls = Arc::new(AtomicU32::new(0));
        let factory: Arc<dyn ModelFactory> = Arc::new(StubFactory { responses: vec![] });
        let tools = Arc::new(registry_with_market_tool(calls.clone()));
        let node = AnalystNode::new(AnalystRole::Market, factory, tools, ModelProfile::Quick);

        let state = AgentState::new("run1", "not a ticker", "2024-05-10");
        let out = node.run(state).await;

        assert!(out.market_report.contains("analysis failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
