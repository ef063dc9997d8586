//! Post-analyst stages (spec §4.H): bull/bear investment debate, research
//! manager synthesis, trader plan, risky/safe/neutral risk debate, and
//! final risk judgment. Debate content itself is model-authored (out of
//! scope per spec.md §1); each node here only owns *where* the model's
//! output is filed — debate `history` fields on re-entry, a report slot
//! exactly once at the stage's terminal node — per spec §3's invariant
//! that re-entrant nodes never overwrite report slots.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::model::ModelFactory;
use crate::config::ModelProfile;
use crate::error::CoreError;
use crate::memory::MemoryStore;
use crate::state::{AgentState, Message};

use super::workflow::{Node, WorkflowGraph, END};

pub const BULL_RESEARCHER: &str = "bull_researcher";
pub const BEAR_RESEARCHER: &str = "bear_researcher";
pub const RESEARCH_MANAGER: &str = "research_manager";
pub const TRADER: &str = "trader";
pub const RISKY_DEBATOR: &str = "risky_debator";
pub const SAFE_DEBATOR: &str = "safe_debator";
pub const NEUTRAL_DEBATOR: &str = "neutral_debator";
pub const RISK_JUDGE: &str = "risk_judge";

/// `research_depth`-derived bounds governing debate alternation (spec
/// §4.H, §6's `(max_debate_rounds, max_risk_discuss_rounds)` mapping).
#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    pub max_debate_rounds: u32,
    pub max_risk_discuss_rounds: u32,
    pub max_recur_limit: usize,
    pub model_profile: ModelProfile,
}

async fn recall(memory: Option<&Arc<dyn MemoryStore>>, query: &str) -> Vec<String> {
    match memory {
        Some(m) => m.recall(query).await,
        None => Vec::new(),
    }
}

async fn invoke_once(model_factory: &Arc<dyn ModelFactory>, profile: ModelProfile, system_prompt: String) -> Result<String, CoreError> {
    let model = model_factory.bind_tools(&[], profile);
    let response = model.invoke(&[Message::system(system_prompt)]).await?;
    Ok(response.content)
}

/// Bull/Bear researcher (spec §4.H "BullResearcher ⇄ BearResearcher
/// alternation"). Appends to the shared `history` plus its own side's
/// history; never writes a report slot.
struct InvestmentSideNode {
    is_bull: bool,
    model_factory: Arc<dyn ModelFactory>,
    memory: Option<Arc<dyn MemoryStore>>,
    profile: ModelProfile,
}

#[async_trait]
impl Node for InvestmentSideNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let side = if self.is_bull { "bull" } else { "bear" };
        let recollections = recall(self.memory.as_ref(), &state.company_of_interest).await;
        let prompt = format!(
            "You are the {side} researcher debating {}. Market: {}. Sentiment: {}. News: {}. Fundamentals: {}. Prior debate: {}. Relevant memory: {}.",
            state.company_of_interest,
            state.market_report,
            state.sentiment_report,
            state.news_report,
            state.fundamentals_report,
            state.investment_debate_state.history,
            recollections.join("; "),
        );

        let content = match invoke_once(&self.model_factory, self.profile, prompt).await {
            Ok(c) => c,
            Err(e) => format!("{side} researcher failed: {e}"),
        };

        let entry = format!("[{side}] {content}\n");
        state.investment_debate_state.history.push_str(&entry);
        if self.is_bull {
            state.investment_debate_state.bull_history.push_str(&entry);
        } else {
            state.investment_debate_state.bear_history.push_str(&entry);
        }
        state.investment_debate_state.count += 1;
        state.sender = format!("{side}_researcher");
        state.messages.push(Message::ai(content).named(state.sender.clone()));
        Ok(state)
    }

    fn name(&self) -> &str {
        if self.is_bull {
            BULL_RESEARCHER
        } else {
            BEAR_RESEARCHER
        }
    }
}

/// Synthesizes the debate into `investment_plan` (written exactly once).
struct ResearchManagerNode {
    model_factory: Arc<dyn ModelFactory>,
    profile: ModelProfile,
}

#[async_trait]
impl Node for ResearchManagerNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let prompt = format!(
            "As research manager for {}, judge the debate and produce an investment plan. Debate: {}",
            state.company_of_interest, state.investment_debate_state.history,
        );
        let content = match invoke_once(&self.model_factory, self.profile, prompt).await {
            Ok(c) => c,
            Err(e) => format!("research manager failed: {e}"),
        };
        state.investment_debate_state.judge_decision = content.clone();
        state.investment_plan = content.clone();
        state.sender = RESEARCH_MANAGER.to_string();
        state.messages.push(Message::ai(content).named(state.sender.clone()));
        Ok(state)
    }

    fn name(&self) -> &str {
        RESEARCH_MANAGER
    }
}

/// Produces `trader_investment_plan` from `investment_plan`.
struct TraderNode {
    model_factory: Arc<dyn ModelFactory>,
    profile: ModelProfile,
}

#[async_trait]
impl Node for TraderNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let prompt = format!(
            "As trader for {}, turn this investment plan into a concrete trade proposal: {}",
            state.company_of_interest, state.investment_plan,
        );
        let content = match invoke_once(&self.model_factory, self.profile, prompt).await {
            Ok(c) => c,
            Err(e) => format!("trader failed: {e}"),
        };
        state.trader_investment_plan = content.clone();
        state.sender = TRADER.to_string();
        state.messages.push(Message::ai(content).named(state.sender.clone()));
        Ok(state)
    }

    fn name(&self) -> &str {
        TRADER
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RiskSpeaker {
    Risky,
    Safe,
    Neutral,
}

impl RiskSpeaker {
    fn label(self) -> &'static str {
        match self {
            RiskSpeaker::Risky => "risky",
            RiskSpeaker::Safe => "safe",
            RiskSpeaker::Neutral => "neutral",
        }
    }

    fn node_name(self) -> &'static str {
        match self {
            RiskSpeaker::Risky => RISKY_DEBATOR,
            RiskSpeaker::Safe => SAFE_DEBATOR,
            RiskSpeaker::Neutral => NEUTRAL_DEBATOR,
        }
    }

    /// Risky → Safe → Neutral → Risky … rotation (spec §4.H).
    fn next(self) -> Self {
        match self {
            RiskSpeaker::Risky => RiskSpeaker::Safe,
            RiskSpeaker::Safe => RiskSpeaker::Neutral,
            RiskSpeaker::Neutral => RiskSpeaker::Risky,
        }
    }
}

/// One of risky/safe/neutral's turns; appends history and advances
/// `latest_speaker`, never writes a report slot.
struct RiskDebateNode {
    speaker: RiskSpeaker,
    model_factory: Arc<dyn ModelFactory>,
    profile: ModelProfile,
}

#[async_trait]
impl Node for RiskDebateNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let label = self.speaker.label();
        let prompt = format!(
            "You are the {label} risk debator evaluating the trade proposal for {}: {}. Prior risk debate: {}",
            state.company_of_interest, state.trader_investment_plan, state.risk_debate_state.history,
        );
        let content = match invoke_once(&self.model_factory, self.profile, prompt).await {
            Ok(c) => c,
            Err(e) => format!("{label} risk debator failed: {e}"),
        };

        let entry = format!("[{label}] {content}\n");
        state.risk_debate_state.history.push_str(&entry);
        match self.speaker {
            RiskSpeaker::Risky => state.risk_debate_state.risky_history.push_str(&entry),
            RiskSpeaker::Safe => state.risk_debate_state.safe_history.push_str(&entry),
            RiskSpeaker::Neutral => state.risk_debate_state.neutral_history.push_str(&entry),
        }
        state.risk_debate_state.count += 1;
        state.risk_debate_state.latest_speaker = label.to_string();
        state.sender = self.speaker.node_name().to_string();
        state.messages.push(Message::ai(content).named(state.sender.clone()));
        Ok(state)
    }

    fn name(&self) -> &str {
        self.speaker.node_name()
    }
}

/// Terminal risk judgment: writes `risk_assessment` and
/// `final_trade_decision` exactly once.
struct RiskJudgeNode {
    model_factory: Arc<dyn ModelFactory>,
    profile: ModelProfile,
}

#[async_trait]
impl Node for RiskJudgeNode {
    async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let prompt = format!(
            "As risk judge for {}, render the final trade decision given: trade proposal {}; risk debate {}",
            state.company_of_interest, state.trader_investment_plan, state.risk_debate_state.history,
        );
        let content = match invoke_once(&self.model_factory, self.profile, prompt).await {
            Ok(c) => c,
            Err(e) => format!("risk judge failed: {e}"),
        };
        state.risk_debate_state.judge_decision = content.clone();
        state.risk_assessment = content.clone();
        state.final_trade_decision = content.clone();
        state.sender = RISK_JUDGE.to_string();
        state.messages.push(Message::ai(content).named(state.sender.clone()));
        Ok(state)
    }

    fn name(&self) -> &str {
        RISK_JUDGE
    }
}

/// Wires [`BULL_RESEARCHER`] through [`RISK_JUDGE`] into `graph`, ending at
/// [`END`]. Shared by both the sequential and parallel analyst topologies
/// (spec §4.H "Post-analyst stages are identical in both topologies").
pub fn wire_post_analyst_stages(
    graph: &mut WorkflowGraph,
    model_factory: Arc<dyn ModelFactory>,
    memory: Option<Arc<dyn MemoryStore>>,
    config: GraphConfig,
) {
    let profile = config.model_profile;
    graph.add_node(Arc::new(InvestmentSideNode {
        is_bull: true,
        model_factory: model_factory.clone(),
        memory: memory.clone(),
        profile,
    }));
    graph.add_node(Arc::new(InvestmentSideNode {
        is_bull: false,
        model_factory: model_factory.clone(),
        memory,
        profile,
    }));
    graph.add_node(Arc::new(ResearchManagerNode {
        model_factory: model_factory.clone(),
        profile,
    }));
    graph.add_node(Arc::new(TraderNode {
        model_factory: model_factory.clone(),
        profile,
    }));
    graph.add_node(Arc::new(RiskDebateNode {
        speaker: RiskSpeaker::Risky,
        model_factory: model_factory.clone(),
        profile,
    }));
    graph.add_node(Arc::new(RiskDebateNode {
        speaker: RiskSpeaker::Safe,
        model_factory: model_factory.clone(),
        profile,
    }));
    graph.add_node(Arc::new(RiskDebateNode {
        speaker: RiskSpeaker::Neutral,
        model_factory: model_factory.clone(),
        profile,
    }));
    graph.add_node(Arc::new(RiskJudgeNode { model_factory, profile }));

    let investment_bound = 2 * config.max_debate_rounds;
    graph.add_conditional_edge(
        BULL_RESEARCHER,
        Arc::new(move |state: &AgentState| {
            if state.investment_debate_state.count < investment_bound {
                BEAR_RESEARCHER.to_string()
            } else {
                RESEARCH_MANAGER.to_string()
            }
        }),
    );
    graph.add_conditional_edge(
        BEAR_RESEARCHER,
        Arc::new(move |state: &AgentState| {
            if state.investment_debate_state.count < investment_bound {
                BULL_RESEARCHER.to_string()
            } else {
                RESEARCH_MANAGER.to_string()
            }
        }),
    );
    graph.add_edge(RESEARCH_MANAGER, TRADER);
    graph.add_edge(TRADER, RISKY_DEBATOR);

    let risk_bound = 3 * config.max_risk_discuss_rounds;
    for speaker in [RiskSpeaker::Risky, RiskSpeaker::Safe, RiskSpeaker::Neutral] {
        graph.add_conditional_edge(
            speaker.node_name(),
            Arc::new(move |state: &AgentState| {
                if state.risk_debate_state.count < risk_bound {
                    speaker.next().node_name().to_string()
                } else {
                    RISK_JUDGE.to_string()
                }
            }),
        );
    }
    graph.add_edge(RISK_JUDGE, END);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::model::{BoundModel, ModelResponse};
    use crate::error::CoreError as Err;

    struct EchoModel;
    #[async_trait]
    impl BoundModel for EchoModel {
        async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, Err> {
            Ok(ModelResponse {
                content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                tool_calls: vec![],
            })
        }
    }
    struct EchoFactory;
    impl ModelFactory for EchoFactory {
        fn bind_tools(&self, _tool_names: &[String], _profile: ModelProfile) -> Box<dyn BoundModel> {
            Box::new(EchoModel)
        }
    }

    #[tokio::test]
    async fn debate_bound_and_manager_runs_exactly_once() {
        let config = GraphConfig {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            max_recur_limit: 100,
            model_profile: ModelProfile::Quick,
        };
        let mut graph = WorkflowGraph::new(BULL_RESEARCHER, config.max_recur_limit);
        wire_post_analyst_stages(&mut graph, Arc::new(EchoFactory), None, config);

        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let out = graph.run(state).await.unwrap();

        assert!(out.investment_debate_state.count <= 2 * config.max_debate_rounds);
        assert!(out.risk_debate_state.count <= 3 * config.max_risk_discuss_rounds);
        assert!(!out.investment_plan.is_empty());
        assert!(!out.final_trade_decision.is_empty());
    }

    #[tokio::test]
    async fn higher_depth_allows_more_debate_turns() {
        let config = GraphConfig {
            max_debate_rounds: 2,
            max_risk_discuss_rounds: 2,
            max_recur_limit: 100,
            model_profile: ModelProfile::Deep,
        };
        let mut graph = WorkflowGraph::new(BULL_RESEARCHER, config.max_recur_limit);
        wire_post_analyst_stages(&mut graph, Arc::new(EchoFactory), None, config);

        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let out = graph.run(state).await.unwrap();

        assert_eq!(out.investment_debate_state.count, 2 * config.max_debate_rounds);
        assert_eq!(out.risk_debate_state.count, 3 * config.max_risk_discuss_rounds);
    }
}
