//! Declarative DAG driver (spec §4.H "Driver semantics").
//!
//! Grounded, as a design reference only, on `other_examples`' `langgraph-core`
//! `StateGraph`/Pregel-superstep loop (not a pack repo, so it cannot be the
//! teacher) — reimplemented here as a small first-party driver since no
//! graph-execution crate is in the teacher's stack.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::state::AgentState;

pub const START: &str = "__start__";
pub const END: &str = "__end__";

/// A named graph node. Implementations are trusted to mutate only the
/// state fields they own (spec §3's "exactly one node writes any given
/// report slot" invariant), so the state a node returns *is* the merge —
/// no separate update/patch record is threaded through the driver.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: AgentState) -> Result<AgentState, CoreError>;
    fn name(&self) -> &str;
}

type Selector = Arc<dyn Fn(&AgentState) -> String + Send + Sync>;

pub enum Edge {
    Unconditional(String),
    Conditional(Selector),
}

pub struct WorkflowGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    entry: String,
    max_recur_limit: usize,
}

impl WorkflowGraph {
    pub fn new(entry: impl Into<String>, max_recur_limit: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: entry.into(),
            max_recur_limit,
        }
    }

    pub fn add_node(&mut self, node: Arc<dyn Node>) {
        self.nodes.insert(node.name().to_string(), node);
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges.insert(from.to_string(), Edge::Unconditional(to.to_string()));
    }

    pub fn add_conditional_edge(&mut self, from: &str, selector: Selector) {
        self.edges.insert(from.to_string(), Edge::Conditional(selector));
    }

    /// Drives `state` from the entry node to [`END`], consulting the
    /// outgoing edge after each node runs (spec §4.H). `max_recur_limit`
    /// node transitions per run; exceeding it is a fatal [`CoreError::GraphStuck`].
    pub async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
        let mut current = self.entry.clone();
        let mut transitions = 0usize;

        loop {
            if current == END {
                return Ok(state);
            }
            if state.cancelled {
                return Err(CoreError::Cancelled);
            }

            transitions += 1;
            if transitions > self.max_recur_limit {
                return Err(CoreError::GraphStuck(self.max_recur_limit));
            }

            let node = self
                .nodes
                .get(&current)
                .cloned()
                .ok_or_else(|| CoreError::GraphStuck(self.max_recur_limit))?;

            tracing::debug!(node = %current, transition = transitions, "graph node transition");
            state = node.run(state).await?;

            current = match self.edges.get(&current) {
                Some(Edge::Unconditional(next)) => next.clone(),
                Some(Edge::Conditional(selector)) => selector(&state),
                None => END.to_string(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IncNode(&'static str);

    #[async_trait]
    impl Node for IncNode {
        async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
            state.investment_debate_state.count += 1;
            state.sender = self.0.to_string();
            Ok(state)
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    #[tokio::test]
    async fn linear_chain_reaches_end() {
        let mut graph = WorkflowGraph::new("a", 10);
        graph.add_node(Arc::new(IncNode("a")));
        graph.add_node(Arc::new(IncNode("b")));
        graph.add_edge("a", "b");
        graph.add_edge("b", END);

        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let out = graph.run(state).await.unwrap();
        assert_eq!(out.investment_debate_state.count, 2);
        assert_eq!(out.sender, "b");
    }

    #[tokio::test]
    async fn conditional_edge_loops_until_bound_then_exits() {
        let mut graph = WorkflowGraph::new("a", 100);
        graph.add_node(Arc::new(IncNode("a")));
        graph.add_conditional_edge(
            "a",
            Arc::new(|state: &AgentState| {
                if state.investment_debate_state.count < 3 {
                    "a".to_string()
                } else {
                    END.to_string()
                }
            }),
        );

        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let out = graph.run(state).await.unwrap();
        assert_eq!(out.investment_debate_state.count, 3);
    }

    #[tokio::test]
    async fn exceeding_recur_limit_raises_graph_stuck() {
        let mut graph = WorkflowGraph::new("a", 3);
        graph.add_node(Arc::new(IncNode("a")));
        graph.add_edge("a", "a");

        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let err = graph.run(state).await.unwrap_err();
        assert!(matches!(err, CoreError::GraphStuck(3)));
    }

    #[tokio::test]
    async fn cancelled_flag_short_circuits_next_transition() {
        struct CancelNode;
        #[async_trait]
        impl Node for CancelNode {
            async fn run(&self, mut state: AgentState) -> Result<AgentState, CoreError> {
                state.cancelled = true;
                Ok(state)
            }
            fn name(&self) -> &str {
                "cancel"
            }
        }

        let mut graph = WorkflowGraph::new("cancel", 10);
        graph.add_node(Arc::new(CancelNode));
        graph.add_edge("cancel", "cancel");

        let state = AgentState::new("r1", "AAPL", "2024-05-10");
        let err = graph.run(state).await.unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }
}
