// float_cmp: only in tests where assert_eq! on f64 is intentional.
#![cfg_attr(test, allow(clippy::float_cmp))]

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing_subscriber::{self, EnvFilter};

use tradingagents_core::agents::model::{BoundModel, ModelFactory, ModelResponse};
use tradingagents_core::config::{Config, ModelProfile};
use tradingagents_core::error::CoreError;
use tradingagents_core::state::{AnalystRole, Message};
use tradingagents_core::{run_analysis, RunContext};

/// A placeholder model client that never emits tool calls and always
/// proposes HOLD; real deployments supply a `ModelFactory` wired to an
/// actual model provider (spec §6 "Model client (consumed)").
struct EchoModel;

#[async_trait]
impl BoundModel for EchoModel {
    async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, CoreError> {
        Ok(ModelResponse {
            content: "FINAL TRANSACTION PROPOSAL: **HOLD**\nNo live model client configured.".to_string(),
            tool_calls: vec![],
        })
    }
}

struct EchoModelFactory;

impl ModelFactory for EchoModelFactory {
    fn bind_tools(&self, _tool_names: &[String], _profile: ModelProfile) -> Box<dyn BoundModel> {
        Box::new(EchoModel)
    }
}

struct Cli {
    ticker: String,
    trade_date: String,
    analysts: Vec<String>,
    research_depth: u8,
    parallel: bool,
}

/// Minimal positional + `--flag[=value]` parser, in the style of
/// `CachedStore::from_env`'s plain `std::env` reads: `ticker trade_date
/// [--analysts a,b,c] [--research-depth N] [--parallel]`.
fn parse_cli(mut args: impl Iterator<Item = String>) -> Result<Cli> {
    args.next(); // argv[0]
    let ticker = args.next().context("usage: <ticker> <trade_date> [--analysts a,b] [--research-depth N] [--parallel]")?;
    let trade_date = args.next().context("missing <trade_date>")?;

    let mut analysts = vec!["market".to_string(), "social".to_string(), "news".to_string(), "fundamentals".to_string()];
    let mut research_depth = 3;
    let mut parallel = false;

    for arg in args {
        if let Some(value) = arg.strip_prefix("--analysts=") {
            analysts = value.split(',').map(str::to_string).collect();
        } else if let Some(value) = arg.strip_prefix("--research-depth=") {
            research_depth = value.parse().context("--research-depth must be a small integer")?;
        } else if arg == "--parallel" {
            parallel = true;
        } else {
            anyhow::bail!("unrecognized argument: {arg}");
        }
    }

    Ok(Cli { ticker, trade_date, analysts, research_depth, parallel })
}

fn parse_role(name: &str) -> Option<AnalystRole> {
    match name.trim() {
        "market" => Some(AnalystRole::Market),
        "social" => Some(AnalystRole::Social),
        "news" => Some(AnalystRole::News),
        "fundamentals" => Some(AnalystRole::Fundamentals),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_cli(std::env::args())?;
    let analysts: Vec<AnalystRole> = cli.analysts.iter().filter_map(|s| parse_role(s)).collect();
    if analysts.is_empty() {
        anyhow::bail!("no recognized analyst roles in {:?}", cli.analysts);
    }

    let mut config = Config::from_env();
    config.parallel_analysts = cli.parallel || config.parallel_analysts;

    let ctx = RunContext::new(config, Arc::new(EchoModelFactory), None, |_providers| {
        // No live upstream adapters registered: this binary demonstrates
        // graph wiring only. Real deployments register data-vendor
        // adapters here (spec §4.D "Provider").
    })
    .await?;

    let (state, decision) = run_analysis(&ctx, &cli.ticker, &cli.trade_date, &analysts, cli.research_depth).await?;

    tracing::info!(
        action = ?decision.action,
        confidence = decision.confidence,
        target_price = ?decision.target_price,
        "analysis complete"
    );
    println!("{}", serde_json::to_string_pretty(&decision)?);
    println!("---");
    println!("reasoning: {}", decision.reasoning);
    let _ = state;

    Ok(())
}
