//! Parallel Executor (spec §4.G): runs a set of Analyst Nodes
//! concurrently against deep-copied state, bounded by a worker-pool
//! semaphore, merging results back by field. Uses `tokio::task::JoinSet`
//! since node bodies call async model clients, mirroring the
//! bounded-concurrency shape the wider corpus uses for thread pools but
//! adapted to async tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::agents::AnalystNode;
use crate::state::{AgentState, AnalystRole, OverallPerformance, ParallelPerformance, RolePerformance};

pub struct ParallelExecutor {
    pub max_parallel_workers: usize,
    pub analyst_timeout: Duration,
}

impl ParallelExecutor {
    pub fn new(max_parallel_workers: usize, analyst_timeout: Duration) -> Self {
        Self {
            max_parallel_workers,
            analyst_timeout,
        }
    }

    /// Run every `(role, node)` pair against a deep copy of `base_state`,
    /// then merge results back (spec §4.G steps 1-4).
    pub async fn run(&self, nodes: &[Arc<AnalystNode>], base_state: &AgentState) -> AgentState {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_workers.max(1)));
        let mut join_set: JoinSet<(AnalystRole, Duration, Option<AgentState>)> = JoinSet::new();

        for node in nodes {
            let node = node.clone();
            let branch_state = base_state.clone();
            let semaphore = semaphore.clone();
            let timeout = self.analyst_timeout;
            let role = node.role();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let started = Instant::now();
                let result = tokio::time::timeout(timeout, node.run(branch_state)).await;
                let elapsed = started.elapsed();
                (role, elapsed, result.ok())
            });
        }

        let mut outcomes = Vec::with_capacity(nodes.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!(error = %e, "analyst task panicked"),
            }
        }
        // Preserve a deterministic merge order independent of completion
        // timing, matching the registration order of `nodes`.
        outcomes.sort_by_key(|(role, _, _)| nodes.iter().position(|n| n.role() == *role).unwrap_or(usize::MAX));

        let base_len = base_state.messages.len();
        merge(base_state.clone(), base_len, outcomes)
    }
}

fn merge(mut output: AgentState, base_len: usize, outcomes: Vec<(AnalystRole, Duration, Option<AgentState>)>) -> AgentState {
    let mut per_role = HashMap::new();
    let mut successes = 0usize;
    let total = outcomes.len().max(1);
    let mut total_duration = Duration::ZERO;

    for (role, duration, branch) in outcomes {
        total_duration += duration;
        match branch {
            Some(branch_state) => {
                successes += 1;
                output.messages.extend(branch_state.messages.into_iter().skip(base_len));
                let report = branch_state.report_slot(role).to_string();
                *output.report_slot_mut(role) = report.clone();
                output.sender = branch_state.sender;
                per_role.insert(
                    role.name().to_string(),
                    RolePerformance {
                        duration_ms: duration.as_millis() as u64,
                        success: true,
                        error: None,
                        report_length: report.len(),
                    },
                );
            }
            None => {
                let degraded = format!("{} analysis failed: timed out", role.name());
                *output.report_slot_mut(role) = degraded.clone();
                per_role.insert(
                    role.name().to_string(),
                    RolePerformance {
                        duration_ms: duration.as_millis() as u64,
                        success: false,
                        error: Some("timed out".to_string()),
                        report_length: degraded.len(),
                    },
                );
            }
        }
    }

    output.parallel_performance = Some(ParallelPerformance {
        per_role,
        overall: OverallPerformance {
            duration_ms: total_duration.as_millis() as u64,
            success_rate: successes as f64 / total as f64,
        },
    });
    output
}
