//! Shared data model flowing through the workflow graph (spec §3).
//!
//! `AgentState` is the single record threaded through every node; report
//! slots are written exactly once per run (never overwritten — re-entrant
//! debate nodes append to `investment_debate_state`/`risk_debate_state`
//! instead, per the §3 invariant and §9's explicit resolution).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Human,
    Ai,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// `{role, content, tool_calls?, tool_call_id?}` plus an ambient `name`
/// field (spec.md §3 supplemented by `tradingagents/agents/utils/agent_utils.py`):
/// analyst-role attribution on `ai` messages, consulted only for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Tag from the closed analyst-role set (spec §3). Extensible; the core
/// only requires each role is paired with a node function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystRole {
    Market,
    Social,
    News,
    Fundamentals,
}

impl AnalystRole {
    pub fn name(self) -> &'static str {
        match self {
            AnalystRole::Market => "market",
            AnalystRole::Social => "social",
            AnalystRole::News => "news",
            AnalystRole::Fundamentals => "fundamentals",
        }
    }

    pub fn all() -> [AnalystRole; 4] {
        [
            AnalystRole::Market,
            AnalystRole::Social,
            AnalystRole::News,
            AnalystRole::Fundamentals,
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestmentDebateState {
    pub history: String,
    pub bull_history: String,
    pub bear_history: String,
    pub count: u32,
    pub judge_decision: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskDebateState {
    pub history: String,
    pub risky_history: String,
    pub safe_history: String,
    pub neutral_history: String,
    pub count: u32,
    pub latest_speaker: String,
    pub judge_decision: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolePerformance {
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub report_length: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverallPerformance {
    pub duration_ms: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelPerformance {
    pub per_role: HashMap<String, RolePerformance>,
    pub overall: OverallPerformance,
}

/// Per-analyst-turn bookkeeping threaded across the `M_i`/`T_i` graph-node
/// boundary in the sequential topology (spec.md §4.H.1): since each loop
/// iteration is now a separate node invocation rather than a local `loop`,
/// this carries what the old in-function locals used to hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystTurnState {
    pub role: AnalystRole,
    pub turn_start_len: usize,
    pub iterations: u32,
    pub forced_invocation_done: bool,
    /// Set once `M_i` has settled a final report slot (or failed); the
    /// `M_i → {T_i, C_i}` selector reads this to route to `C_i`.
    pub done: bool,
    /// The most recent model response's text, kept for the iteration-cap
    /// finalization path where no further model invocation happens.
    pub last_model_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub run_id: String,
    pub company_of_interest: String,
    pub trade_date: String,
    pub messages: Vec<Message>,
    pub sender: String,

    /// Live only between an `M_i` node's first entry for a role and its
    /// matching `C_i` cleanup (spec.md §4.H.1); `None` outside that window.
    pub analyst_turn: Option<AnalystTurnState>,

    pub market_report: String,
    pub sentiment_report: String,
    pub news_report: String,
    pub fundamentals_report: String,
    pub investment_plan: String,
    pub trader_investment_plan: String,
    pub final_trade_decision: String,
    pub risk_assessment: String,

    pub investment_debate_state: InvestmentDebateState,
    pub risk_debate_state: RiskDebateState,
    pub parallel_performance: Option<ParallelPerformance>,

    /// Cooperative-cancellation flag checked by the graph driver between
    /// node transitions (spec.md §5, supplemented by SPEC_FULL §3).
    pub cancelled: bool,
}

impl AgentState {
    pub fn new(run_id: impl Into<String>, ticker: impl Into<String>, trade_date: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            company_of_interest: ticker.into(),
            trade_date: trade_date.into(),
            messages: Vec::new(),
            sender: String::new(),
            analyst_turn: None,
            market_report: String::new(),
            sentiment_report: String::new(),
            news_report: String::new(),
            fundamentals_report: String::new(),
            investment_plan: String::new(),
            trader_investment_plan: String::new(),
            final_trade_decision: String::new(),
            risk_assessment: String::new(),
            investment_debate_state: InvestmentDebateState::default(),
            risk_debate_state: RiskDebateState::default(),
            parallel_performance: None,
            cancelled: false,
        }
    }

    /// Mutable access to the report slot owned by `role` (spec §3).
    pub fn report_slot_mut(&mut self, role: AnalystRole) -> &mut String {
        match role {
            AnalystRole::Market => &mut self.market_report,
            AnalystRole::Social => &mut self.sentiment_report,
            AnalystRole::News => &mut self.news_report,
            AnalystRole::Fundamentals => &mut self.fundamentals_report,
        }
    }

    pub fn report_slot(&self, role: AnalystRole) -> &str {
        match role {
            AnalystRole::Market => &self.market_report,
            AnalystRole::Social => &self.sentiment_report,
            AnalystRole::News => &self.news_report,
            AnalystRole::Fundamentals => &self.fundamentals_report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_slot_mut_routes_to_the_right_field() {
        let mut state = AgentState::new("r1", "AAPL", "2024-01-01");
        *state.report_slot_mut(AnalystRole::News) = "degraded".to_string();
        assert_eq!(state.news_report, "degraded");
        assert_eq!(state.report_slot(AnalystRole::News), "degraded");
    }
}
