//! Workflow Graph (spec §4.H): a declarative DAG driver plus the two
//! required topologies — sequential analysts and parallel analysts —
//! both converging on the shared post-analyst debate/judgment stages.
//!
//! The two topologies take different shortcuts around spec.md §4.H.1's
//! `M_i → T_i → C_i` per-analyst decomposition. §4.H.2 explicitly sanctions
//! running the tool loop inside the analyst node for the *parallel*
//! topology only, so [`build_parallel_graph`] keeps reusing
//! [`crate::agents::AnalystNode::run`]'s monolithic loop. The sequential
//! topology gets no such exemption — each role is wired as a literal
//! `M_i`/`T_i`/`C_i` triple ([`AnalystTurnNode`]/[`ToolTurnNode`]/
//! [`MessageCleanupNode`]) so `C_i` can strip that analyst's own
//! intermediate tool-call/tool-response messages before the next
//! analyst's `M_{i+1}` sees `state.messages`.

pub mod debate;
pub mod workflow;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::analyst::{build_system_prompt, fail_report, forced_tool_call, warn_on_ticker_mismatch};
use crate::agents::model::ModelFactory;
use crate::agents::AnalystNode;
use crate::config::ModelProfile;
use crate::error::CoreError;
use crate::market::classify;
use crate::memory::MemoryStore;
use crate::parallel::ParallelExecutor;
use crate::state::{AgentState, AnalystRole, AnalystTurnState, Message};
use crate::tools::{dispatch, ToolRegistry};

pub use debate::GraphConfig;
pub use workflow::{Node, WorkflowGraph, END, START};

fn analyst_node_name(role: AnalystRole) -> String {
    format!("analyst_{}", role.name())
}

fn tool_turn_node_name(role: AnalystRole) -> String {
    format!("analyst_{}_tools", role.name())
}

fn cleanup_node_name(role: AnalystRole) -> String {
    format!("analyst_{}_cleanup", role.name())
}

/// `M_i` (spec.md §4.H.1): builds the prompt from `state.messages` as it
/// stands (already cleaned of earlier analysts' intermediate messages by
/// their own `C_i`), invokes the model, and either pushes a tool-call
/// message (routing to `T_i`) or settles the report slot (routing to
/// `C_i`). One node instance is re-entered once per loop iteration; turn
/// bookkeeping that used to live in local loop variables now lives in
/// `state.analyst_turn` so it survives the node-boundary round trip.
struct AnalystTurnNode {
    name: String,
    role: AnalystRole,
    model_factory: Arc<dyn ModelFactory>,
    tools: Arc<ToolRegistry>,
    profile: ModelProfile,
    iteration_cap: u32,
}

impl AnalystTurnNode {
    fn mark_done(state: &mut AgentState) {
        if let Some(turn) = state.analyst_turn.as_mut() {
            turn.done = true;
        }
    }
}

#[async_trait]
impl Node for AnalystTurnNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let fresh_entry = !matches!(&state.analyst_turn, Some(turn) if turn.role == self.role);
        if fresh_entry {
            state.analyst_turn = Some(AnalystTurnState {
                role: self.role,
                turn_start_len: state.messages.len(),
                iterations: 0,
                forced_invocation_done: false,
                done: false,
                last_model_content: String::new(),
            });
        }

        let classification = match classify(&state.company_of_interest) {
            Ok(c) => c,
            Err(e) => {
                fail_report(&mut state, self.role, &e.to_string());
                Self::mark_done(&mut state);
                return Ok(state);
            }
        };

        let cap_hit = state.analyst_turn.as_ref().is_some_and(|t| t.iterations >= self.iteration_cap);
        if cap_hit {
            let content = state.analyst_turn.as_ref().map(|t| t.last_model_content.clone()).unwrap_or_default();
            *state.report_slot_mut(self.role) = content;
            state.sender = self.role.name().to_string();
            Self::mark_done(&mut state);
            return Ok(state);
        }

        let toolset = self.tools.toolset_for(self.role).to_vec();
        let system_prompt = build_system_prompt(self.role, &state.company_of_interest, &classification, &toolset);
        let model = self.model_factory.bind_tools(&toolset, self.profile);

        let mut turn_messages = vec![Message::system(system_prompt)];
        turn_messages.extend(state.messages.iter().cloned());

        let response = match model.invoke(&turn_messages).await {
            Ok(r) => r,
            Err(e) => {
                fail_report(&mut state, self.role, &e.to_string());
                Self::mark_done(&mut state);
                return Ok(state);
            }
        };

        if let Some(turn) = state.analyst_turn.as_mut() {
            turn.last_model_content = response.content.clone();
        }

        if !response.has_tool_calls() {
            let forced_already = state.analyst_turn.as_ref().is_some_and(|t| t.forced_invocation_done);
            let iterations = state.analyst_turn.as_ref().map(|t| t.iterations).unwrap_or(0);
            if iterations == 0 && !forced_already {
                let primary = self.tools.primary_tool_for(self.role).and_then(|name| self.tools.get(name));
                if let Some(primary) = primary {
                    let call = forced_tool_call(&primary, &state);
                    warn_on_ticker_mismatch(self.role, &call, &state);
                    state
                        .messages
                        .push(Message::ai_with_tool_calls(String::new(), vec![call]).named(self.role.name()));
                    if let Some(turn) = state.analyst_turn.as_mut() {
                        turn.forced_invocation_done = true;
                    }
                    return Ok(state);
                }
            }

            *state.report_slot_mut(self.role) = response.content;
            state.sender = self.role.name().to_string();
            Self::mark_done(&mut state);
            return Ok(state);
        }

        for tc in &response.tool_calls {
            warn_on_ticker_mismatch(self.role, tc, &state);
        }
        state
            .messages
            .push(Message::ai_with_tool_calls(response.content, response.tool_calls).named(self.role.name()));
        Ok(state)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// `T_i` (spec.md §4.H.1): dispatches the tool calls `M_i` just emitted
/// and appends the tool-response messages. Unconditionally routes back to
/// `M_i`.
struct ToolTurnNode {
    name: String,
    tools: Arc<ToolRegistry>,
}

#[async_trait]
impl Node for ToolTurnNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let tool_calls = state.messages.last().and_then(|m| m.tool_calls.clone()).unwrap_or_default();
        let tool_messages = dispatch(&self.tools, &tool_calls).await;
        state.messages.extend(tool_messages);
        if let Some(turn) = state.analyst_turn.as_mut() {
            turn.iterations += 1;
        }
        Ok(state)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// `C_i` (spec.md §4.H.1): removes this analyst's own pre-analyst
/// intermediate messages (the tool-call/tool-response pairs its turn
/// produced) and appends a neutral placeholder carrying the settled
/// report text, so `M_{i+1}` never sees a dangling tool message or this
/// analyst's raw tool traffic.
struct MessageCleanupNode {
    name: String,
    role: AnalystRole,
}

#[async_trait]
impl Node for MessageCleanupNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        match state.analyst_turn.take() {
            Some(turn) if turn.role == self.role => {
                state.messages.truncate(turn.turn_start_len);
                let placeholder = state.report_slot(self.role).to_string();
                state.messages.push(Message::ai(placeholder).named(self.role.name()));
            }
            other => state.analyst_turn = other,
        }
        Ok(state)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub const PARALLEL_ANALYSTS: &str = "parallel_analysts";

struct ParallelAnalystsNode {
    executor: ParallelExecutor,
    nodes: Vec<Arc<AnalystNode>>,
}

#[async_trait]
impl Node for ParallelAnalystsNode {
    async fn run(&self, state: AgentState) -> Result<AgentState, CoreError> {
        Ok(self.executor.run(&self.nodes, &state).await)
    }

    fn name(&self) -> &str {
        PARALLEL_ANALYSTS
    }
}

/// Builds the `Sequential analysts` topology (spec §4.H.1): for each role,
/// `M_i →? {T_i, C_i}`, `T_i → M_i`, `C_i → M_{i+1}` (or `BullResearcher`
/// after the last role) — never the monolithic-loop shortcut §4.H.2
/// reserves for the parallel topology.
pub fn build_sequential_graph(
    roles: &[AnalystRole],
    analysts: &HashMap<AnalystRole, Arc<AnalystNode>>,
    model_factory: Arc<dyn ModelFactory>,
    memory: Option<Arc<dyn MemoryStore>>,
    config: GraphConfig,
) -> WorkflowGraph {
    let entry = roles.first().map(|r| analyst_node_name(*r)).unwrap_or_else(|| debate::BULL_RESEARCHER.to_string());
    let mut graph = WorkflowGraph::new(entry, config.max_recur_limit);

    for (i, role) in roles.iter().enumerate() {
        let node = analysts
            .get(role)
            .unwrap_or_else(|| panic!("no analyst node registered for role {}", role.name()));

        let m_name = analyst_node_name(*role);
        let t_name = tool_turn_node_name(*role);
        let c_name = cleanup_node_name(*role);

        graph.add_node(Arc::new(AnalystTurnNode {
            name: m_name.clone(),
            role: *role,
            model_factory: node.model_factory(),
            tools: node.tools(),
            profile: node.profile(),
            iteration_cap: node.iteration_cap(),
        }));
        graph.add_node(Arc::new(ToolTurnNode {
            name: t_name.clone(),
            tools: node.tools(),
        }));
        graph.add_node(Arc::new(MessageCleanupNode { name: c_name.clone(), role: *role }));

        let t_name_for_selector = t_name.clone();
        let c_name_for_selector = c_name.clone();
        graph.add_conditional_edge(
            &m_name,
            Arc::new(move |state: &AgentState| {
                let done = state.analyst_turn.as_ref().is_some_and(|t| t.done);
                if done {
                    return c_name_for_selector.clone();
                }
                let has_tool_calls = state
                    .messages
                    .last()
                    .is_some_and(|m| m.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty()));
                if has_tool_calls {
                    t_name_for_selector.clone()
                } else {
                    c_name_for_selector.clone()
                }
            }),
        );
        graph.add_edge(&t_name, &m_name);

        let next = roles
            .get(i + 1)
            .map(|r| analyst_node_name(*r))
            .unwrap_or_else(|| debate::BULL_RESEARCHER.to_string());
        graph.add_edge(&c_name, &next);
    }

    debate::wire_post_analyst_stages(&mut graph, model_factory, memory, config);
    graph
}

/// Builds the `Parallel analysts` topology (spec §4.H.2):
/// `START → ParallelAnalysts → BullResearcher → … → END`.
pub fn build_parallel_graph(
    roles: &[AnalystRole],
    analysts: &HashMap<AnalystRole, Arc<AnalystNode>>,
    max_parallel_workers: usize,
    analyst_timeout: std::time::Duration,
    model_factory: Arc<dyn ModelFactory>,
    memory: Option<Arc<dyn MemoryStore>>,
    config: GraphConfig,
) -> WorkflowGraph {
    let nodes: Vec<Arc<AnalystNode>> = roles
        .iter()
        .map(|role| {
            analysts
                .get(role)
                .unwrap_or_else(|| panic!("no analyst node registered for role {}", role.name()))
                .clone()
        })
        .collect();

    let mut graph = WorkflowGraph::new(PARALLEL_ANALYSTS, config.max_recur_limit);
    graph.add_node(Arc::new(ParallelAnalystsNode {
        executor: ParallelExecutor::new(max_parallel_workers, analyst_timeout),
        nodes,
    }));
    graph.add_edge(PARALLEL_ANALYSTS, debate::BULL_RESEARCHER);

    debate::wire_post_analyst_stages(&mut graph, model_factory, memory, config);
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::model::{BoundModel, ModelResponse};
    use crate::state::Message;
    use crate::tools::ToolRegistry;

    struct EchoModel;
    #[async_trait]
    impl BoundModel for EchoModel {
        async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, CoreError> {
            Ok(ModelResponse {
                content: "FINAL TRANSACTION PROPOSAL: **HOLD**".to_string(),
                tool_calls: vec![],
            })
        }
    }
    struct EchoFactory;
    impl ModelFactory for EchoFactory {
        fn bind_tools(&self, _tool_names: &[String], _profile: crate::config::ModelProfile) -> Box<dyn BoundModel> {
            Box::new(EchoModel)
        }
    }

    fn config() -> GraphConfig {
        GraphConfig {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            max_recur_limit: 100,
            model_profile: crate::config::ModelProfile::Quick,
        }
    }

    #[tokio::test]
    async fn sequential_topology_reaches_decision() {
        let tools = Arc::new(ToolRegistry::new());
        let factory: Arc<dyn ModelFactory> = Arc::new(EchoFactory);
        let mut analysts = HashMap::new();
        analysts.insert(
            AnalystRole::Market,
            Arc::new(AnalystNode::new(AnalystRole::Market, factory.clone(), tools.clone(), crate::config::ModelProfile::Quick)),
        );

        let graph = build_sequential_graph(&[AnalystRole::Market], &analysts, factory, None, config());
        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let out = graph.run(state).await.unwrap();

        assert_eq!(out.market_report, "FINAL TRANSACTION PROPOSAL: **HOLD**");
        assert!(!out.final_trade_decision.is_empty());
    }

    #[tokio::test]
    async fn sequential_topology_cleans_up_prior_analysts_messages() {
        struct ToolCallThenTextModel {
            tool_name: String,
        }
        #[async_trait]
        impl BoundModel for ToolCallThenTextModel {
            async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, CoreError> {
                let already_called = messages
                    .iter()
                    .any(|m| m.tool_call_id.is_some());
                if already_called {
                    Ok(ModelResponse {
                        content: "FINAL TRANSACTION PROPOSAL: **HOLD**".to_string(),
                        tool_calls: vec![],
                    })
                } else {
                    Ok(ModelResponse {
                        content: String::new(),
                        tool_calls: vec![crate::state::ToolCall {
                            id: "tc1".to_string(),
                            name: self.tool_name.clone(),
                            args: serde_json::json!({"ticker": "AAPL"}).as_object().unwrap().clone(),
                        }],
                    })
                }
            }
        }
        struct ToolCallFactory {
            tool_name: String,
        }
        impl ModelFactory for ToolCallFactory {
            fn bind_tools(&self, _tool_names: &[String], _profile: crate::config::ModelProfile) -> Box<dyn BoundModel> {
                Box::new(ToolCallThenTextModel {
                    tool_name: self.tool_name.clone(),
                })
            }
        }
        struct EchoHandler;
        #[async_trait]
        impl crate::tools::ToolHandler for EchoHandler {
            async fn call(&self, _args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError> {
                Ok("{}".to_string())
            }
        }

        let mut tools = ToolRegistry::new();
        tools.register(crate::tools::ToolDescriptor::new(
            "get_stock_market_data_unified",
            "d",
            vec![crate::tools::ToolArgSpec::required("ticker", crate::tools::ArgKind::Ticker, "d")],
            Arc::new(EchoHandler),
        ));
        tools.assign_to_role(AnalystRole::Market, "get_stock_market_data_unified");
        tools.register(crate::tools::ToolDescriptor::new(
            "get_news_unified",
            "d",
            vec![crate::tools::ToolArgSpec::required("ticker", crate::tools::ArgKind::Ticker, "d")],
            Arc::new(EchoHandler),
        ));
        tools.assign_to_role(AnalystRole::News, "get_news_unified");
        let tools = Arc::new(tools);

        let market_factory: Arc<dyn ModelFactory> = Arc::new(ToolCallFactory {
            tool_name: "get_stock_market_data_unified".to_string(),
        });
        let news_factory: Arc<dyn ModelFactory> = Arc::new(ToolCallFactory {
            tool_name: "get_news_unified".to_string(),
        });

        let mut analysts = HashMap::new();
        analysts.insert(
            AnalystRole::Market,
            Arc::new(AnalystNode::new(AnalystRole::Market, market_factory.clone(), tools.clone(), crate::config::ModelProfile::Quick)),
        );
        analysts.insert(
            AnalystRole::News,
            Arc::new(AnalystNode::new(AnalystRole::News, news_factory, tools, crate::config::ModelProfile::Quick)),
        );

        let graph = build_sequential_graph(&[AnalystRole::Market, AnalystRole::News], &analysts, market_factory, None, config());
        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let out = graph.run(state).await.unwrap();

        assert!(out.market_report.contains("HOLD"));
        assert!(out.news_report.contains("HOLD"));

        // The market analyst's own tool-call/tool-response pair must not
        // survive into the final transcript the news analyst (and debate
        // stages) saw: only one placeholder message per completed analyst,
        // never the raw tool traffic that produced it.
        let tool_call_messages = out.messages.iter().filter(|m| m.tool_calls.is_some()).count();
        let tool_response_messages = out.messages.iter().filter(|m| m.tool_call_id.is_some()).count();
        assert_eq!(tool_call_messages, 0, "M_i's tool-call messages must be cleaned up by C_i");
        assert_eq!(tool_response_messages, 0, "T_i's tool-response messages must be cleaned up by C_i");

        let market_placeholders = out.messages.iter().filter(|m| m.name.as_deref() == Some("market")).count();
        let news_placeholders = out.messages.iter().filter(|m| m.name.as_deref() == Some("news")).count();
        assert_eq!(market_placeholders, 1, "exactly one cleaned placeholder survives per analyst");
        assert_eq!(news_placeholders, 1, "exactly one cleaned placeholder survives per analyst");
    }

    #[tokio::test]
    async fn parallel_topology_reaches_decision() {
        let tools = Arc::new(ToolRegistry::new());
        let factory: Arc<dyn ModelFactory> = Arc::new(EchoFactory);
        let mut analysts = HashMap::new();
        analysts.insert(
            AnalystRole::Market,
            Arc::new(AnalystNode::new(AnalystRole::Market, factory.clone(), tools.clone(), crate::config::ModelProfile::Quick)),
        );
        analysts.insert(
            AnalystRole::News,
            Arc::new(AnalystNode::new(AnalystRole::News, factory.clone(), tools, crate::config::ModelProfile::Quick)),
        );

        let graph = build_parallel_graph(
            &[AnalystRole::Market, AnalystRole::News],
            &analysts,
            4,
            std::time::Duration::from_secs(5),
            factory,
            None,
            config(),
        );
        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let out = graph.run(state).await.unwrap();

        assert_eq!(out.market_report, "FINAL TRANSACTION PROPOSAL: **HOLD**");
        assert_eq!(out.news_report, "FINAL TRANSACTION PROPOSAL: **HOLD**");
        assert!(!out.final_trade_decision.is_empty());
    }
}
