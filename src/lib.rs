#![allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]

//! Graph-orchestrated multi-agent stock analysis core.
//!
//! [`run_analysis`] is the single exposed entry point (spec §6): it drives
//! a [`graph::WorkflowGraph`] from the selected analyst topology through
//! investment/risk debate to a [`decision::Decision`]. Every collaborator
//! that is "consumed" rather than implemented by this crate — the model
//! client, live upstream data adapters — is dependency-injected via
//! [`RunContext`], built once per run and threaded by `Arc` (never a
//! global singleton), per the GLOSSARY's `RunContext` entry.

pub mod agents;
pub mod cache;
pub mod config;
pub mod decision;
pub mod error;
pub mod graph;
pub mod market;
pub mod memory;
pub mod parallel;
pub mod providers;
pub mod retry;
pub mod state;
pub mod tools;

use std::sync::Arc;

use uuid::Uuid;

use agents::model::ModelFactory;
use cache::backend::{BackendKind, CacheBackend};
use cache::file::FileBackend;
use cache::memory::MemoryBackend;
use cache::CacheManager;
use config::Config;
use error::CoreError;
use graph::{build_parallel_graph, build_sequential_graph, GraphConfig};
use market::classify;
use memory::MemoryStore;
use providers::ProviderRegistry;
use retry::breaker::{BreakerConfig, BreakerRegistry};
use retry::monitor::ErrorMonitor;
use state::{AgentState, AnalystRole};
use tools::builtin::install_default_toolset;
use tools::ToolRegistry;

pub use decision::Decision;

/// The dependency-injected bundle constructed once per [`run_analysis`]
/// call (GLOSSARY "RunContext"): `Config`, cache/retry/breaker
/// infrastructure, the provider registry (with upstream adapters already
/// registered by the caller), the tool registry, and the external model
/// client factory.
pub struct RunContext {
    pub config: Config,
    pub cache: Arc<CacheManager>,
    pub breakers: Arc<BreakerRegistry>,
    pub monitor: Arc<ErrorMonitor>,
    pub providers: Arc<ProviderRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub model_factory: Arc<dyn ModelFactory>,
    pub memory: Option<Arc<dyn MemoryStore>>,
}

impl RunContext {
    /// Assembles cache, breaker, and tool-registry infrastructure from
    /// `config`; `register_providers` is given the chance to register
    /// upstream adapters against the freshly-built `ProviderRegistry`
    /// before it is frozen behind an `Arc` (spec §4.D: upstream adapters
    /// are supplied by the caller, not this crate).
    pub async fn new(
        config: Config,
        model_factory: Arc<dyn ModelFactory>,
        memory: Option<Arc<dyn MemoryStore>>,
        register_providers: impl FnOnce(&mut ProviderRegistry),
    ) -> anyhow::Result<Self> {
        let cache = Arc::new(build_cache_manager(&config).await?);
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        let monitor = Arc::new(ErrorMonitor::default());

        let mut providers = ProviderRegistry::new(cache.clone(), breakers.clone(), monitor.clone());
        register_providers(&mut providers);
        let providers = Arc::new(providers);

        let mut tools = ToolRegistry::new();
        install_default_toolset(&mut tools, providers.clone(), config.online_tools);

        Ok(Self {
            config,
            cache,
            breakers,
            monitor,
            providers,
            tools: Arc::new(tools),
            model_factory,
            memory,
        })
    }
}

async fn build_cache_manager(config: &Config) -> anyhow::Result<CacheManager> {
    let primary = build_backend(config.cache.primary_backend, config).await?;
    let mut fallbacks = Vec::with_capacity(config.cache.fallback_backends.len());
    for kind in &config.cache.fallback_backends {
        fallbacks.push(build_backend(*kind, config).await?);
    }
    Ok(CacheManager::new(primary, fallbacks))
}

async fn build_backend(kind: BackendKind, config: &Config) -> anyhow::Result<Arc<dyn CacheBackend>> {
    match kind {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(config.cache.memory_max_entries))),
        BackendKind::File => Ok(Arc::new(FileBackend::new(config.cache.file_cache_dir.clone()).await?)),
    }
}

/// The single exposed entry point (spec §6): `run_analysis(ticker,
/// trade_date, analysts, research_depth, config) → (state, decision)`.
/// Raises only `InvalidTicker`, `GraphStuck`, or `Cancelled` (spec §7);
/// every other failure mode degrades into report text and a HOLD
/// decision rather than propagating.
pub async fn run_analysis(
    ctx: &RunContext,
    ticker: &str,
    trade_date: &str,
    analysts: &[AnalystRole],
    research_depth: u8,
) -> Result<(AgentState, Decision), CoreError> {
    classify(ticker)?;

    let depth = config::depth_profile(research_depth);
    let graph_config = GraphConfig {
        max_debate_rounds: depth.max_debate_rounds,
        max_risk_discuss_rounds: depth.max_risk_discuss_rounds,
        max_recur_limit: ctx.config.max_recur_limit,
        model_profile: depth.model_profile,
    };

    let mut analyst_nodes = std::collections::HashMap::new();
    for role in analysts {
        analyst_nodes.insert(
            *role,
            Arc::new(agents::AnalystNode::new(
                *role,
                ctx.model_factory.clone(),
                ctx.tools.clone(),
                depth.model_profile,
            )),
        );
    }

    let graph = if ctx.config.parallel_analysts {
        build_parallel_graph(
            analysts,
            &analyst_nodes,
            ctx.config.max_parallel_workers,
            std::time::Duration::from_secs(ctx.config.analyst_timeout_secs),
            ctx.model_factory.clone(),
            ctx.memory.clone(),
            graph_config,
        )
    } else {
        build_sequential_graph(analysts, &analyst_nodes, ctx.model_factory.clone(), ctx.memory.clone(), graph_config)
    };

    let run_id = Uuid::new_v4().to_string();
    let state = AgentState::new(run_id, ticker, trade_date);
    let final_state = graph.run(state).await?;
    let decision = decision::parse_decision(&final_state);

    Ok((final_state, decision))
}
