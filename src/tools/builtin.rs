//! Per-role toolsets wired to the Data Provider Registry (spec §4.E).
//!
//! Each handler owns a `garde`+`schemars`-annotated params struct, exactly
//! as `server.rs`'s `DownloadOptionsParams`/`LoadDataParams` are annotated
//! — this is how a tool's `arg_spec` would be produced mechanically in a
//! schema-exporting deployment, even though this dispatcher only consults
//! the coarse [`ToolArgSpec`] list for presence/ticker checks.

use std::sync::Arc;

use garde::Validate;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::CoreError;
use crate::providers::{Capability, ProviderArgs, ProviderRegistry};
use crate::state::AnalystRole;

use super::{ArgKind, ToolArgSpec, ToolDescriptor, ToolHandler, ToolRegistry};

fn stringify(value: &serde_json::Value) -> String {
    if value.is_null() {
        "no data available".to_string()
    } else {
        value.to_string()
    }
}

fn from_args<T: serde::de::DeserializeOwned + Validate>(
    args: serde_json::Map<String, serde_json::Value>,
) -> Result<T, CoreError> {
    let parsed: T = serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|e| CoreError::ToolValidation(e.to_string()))?;
    parsed.validate().map_err(|e| CoreError::ToolValidation(e.to_string()))?;
    Ok(parsed)
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StockHistoryParams {
    #[garde(pattern(r"^[A-Za-z0-9.]{1,10}$"))]
    pub ticker: String,
    #[garde(pattern(r"^\d{4}-\d{2}-\d{2}$"))]
    pub start_date: String,
    #[garde(pattern(r"^\d{4}-\d{2}-\d{2}$"))]
    pub end_date: String,
}

struct StockHistoryHandler {
    registry: Arc<ProviderRegistry>,
    online_tools: bool,
}

#[async_trait::async_trait]
impl ToolHandler for StockHistoryHandler {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError> {
        let params: StockHistoryParams = from_args(args)?;
        let value = self
            .registry
            .fetch(
                Capability::StockHistory,
                ProviderArgs {
                    ticker: Some(params.ticker),
                    start_date: Some(params.start_date),
                    end_date: Some(params.end_date),
                    ..Default::default()
                },
                self.online_tools,
            )
            .await;
        Ok(stringify(&value))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CapitalFlowParams {
    #[garde(pattern(r"^[A-Za-z0-9.]{1,10}$"))]
    pub ticker: String,
    #[garde(inner(pattern(r"^\d{4}-\d{2}-\d{2}$")))]
    pub start_date: Option<String>,
    #[garde(inner(pattern(r"^\d{4}-\d{2}-\d{2}$")))]
    pub end_date: Option<String>,
}

struct CapitalFlowHandler {
    registry: Arc<ProviderRegistry>,
    online_tools: bool,
}

#[async_trait::async_trait]
impl ToolHandler for CapitalFlowHandler {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError> {
        let params: CapitalFlowParams = from_args(args)?;
        let capability = if params.start_date.is_some() && params.end_date.is_some() {
            Capability::CapitalFlowDaily
        } else {
            Capability::CapitalFlowRealtime
        };
        let value = self
            .registry
            .fetch(
                capability,
                ProviderArgs {
                    ticker: Some(params.ticker),
                    start_date: params.start_date,
                    end_date: params.end_date,
                    ..Default::default()
                },
                self.online_tools,
            )
            .await;
        Ok(stringify(&value))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MarketCapitalFlowOverviewParams {
    #[garde(skip)]
    pub days_type: Option<u8>,
}

struct MarketCapitalFlowOverviewHandler {
    registry: Arc<ProviderRegistry>,
    online_tools: bool,
}

#[async_trait::async_trait]
impl ToolHandler for MarketCapitalFlowOverviewHandler {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError> {
        let params: MarketCapitalFlowOverviewParams = from_args(args)?;
        let value = self
            .registry
            .fetch(
                Capability::ConceptList,
                ProviderArgs {
                    days_type: params.days_type,
                    ..Default::default()
                },
                self.online_tools,
            )
            .await;
        Ok(stringify(&value))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct FundamentalsParams {
    #[garde(pattern(r"^[A-Za-z0-9.]{1,10}$"))]
    pub ticker: String,
    #[garde(pattern(r"^\d{4}-\d{2}-\d{2}$"))]
    pub as_of_date: String,
}

struct FundamentalsHandler {
    registry: Arc<ProviderRegistry>,
    online_tools: bool,
}

#[async_trait::async_trait]
impl ToolHandler for FundamentalsHandler {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError> {
        let params: FundamentalsParams = from_args(args)?;
        let value = self
            .registry
            .fetch(
                Capability::Fundamentals,
                ProviderArgs {
                    ticker: Some(params.ticker),
                    as_of_date: Some(params.as_of_date),
                    ..Default::default()
                },
                self.online_tools,
            )
            .await;
        Ok(stringify(&value))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct DividendHistoryParams {
    #[garde(pattern(r"^[A-Za-z0-9.]{1,10}$"))]
    pub ticker: String,
    #[garde(inner(range(min = 1900, max = 2100)))]
    pub start_year: Option<i32>,
    #[garde(inner(range(min = 1900, max = 2100)))]
    pub end_year: Option<i32>,
}

struct DividendHistoryHandler {
    registry: Arc<ProviderRegistry>,
    online_tools: bool,
}

#[async_trait::async_trait]
impl ToolHandler for DividendHistoryHandler {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError> {
        let params: DividendHistoryParams = from_args(args)?;
        let value = self
            .registry
            .fetch(
                Capability::DividendHistory,
                ProviderArgs {
                    ticker: Some(params.ticker),
                    start_year: params.start_year,
                    end_year: params.end_year,
                    ..Default::default()
                },
                self.online_tools,
            )
            .await;
        Ok(stringify(&value))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct NewsParams {
    #[garde(pattern(r"^[A-Za-z0-9.]{1,10}$"))]
    pub ticker: String,
    #[garde(pattern(r"^\d{4}-\d{2}-\d{2}$"))]
    pub as_of_date: String,
}

struct NewsHandler {
    registry: Arc<ProviderRegistry>,
    online_tools: bool,
}

#[async_trait::async_trait]
impl ToolHandler for NewsHandler {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<String, CoreError> {
        let params: NewsParams = from_args(args)?;
        let value = self
            .registry
            .fetch(
                Capability::News,
                ProviderArgs {
                    ticker: Some(params.ticker),
                    as_of_date: Some(params.as_of_date),
                    ..Default::default()
                },
                self.online_tools,
            )
            .await;
        Ok(stringify(&value))
    }
}

/// Build the standard toolset and wire it to `registry`'s four roles
/// (spec §4.E's worked example: market gets the capital-flow trio,
/// fundamentals gets the fundamentals bundle, news and social both read
/// the news capability — no distinct "social media" capability exists in
/// §4.D, so sentiment analysis reuses the news feed).
pub fn install_default_toolset(
    tools: &mut ToolRegistry,
    providers: Arc<ProviderRegistry>,
    online_tools: bool,
) {
    tools.register(ToolDescriptor::new(
        "get_stock_market_data_unified",
        "Historical OHLCV bars for a ticker over a date range.",
        vec![
            ToolArgSpec::required("ticker", ArgKind::Ticker, "ticker symbol"),
            ToolArgSpec::required("start_date", ArgKind::String, "YYYY-MM-DD"),
            ToolArgSpec::required("end_date", ArgKind::String, "YYYY-MM-DD"),
        ],
        Arc::new(StockHistoryHandler {
            registry: providers.clone(),
            online_tools,
        }),
    ));
    tools.register(ToolDescriptor::new(
        "get_capital_flow_analysis",
        "Capital flow series for a ticker; daily when a date range is given, intraday otherwise.",
        vec![
            ToolArgSpec::required("ticker", ArgKind::Ticker, "ticker symbol"),
            ToolArgSpec::optional("start_date", ArgKind::String, "YYYY-MM-DD"),
            ToolArgSpec::optional("end_date", ArgKind::String, "YYYY-MM-DD"),
        ],
        Arc::new(CapitalFlowHandler {
            registry: providers.clone(),
            online_tools,
        }),
    ));
    tools.register(ToolDescriptor::new(
        "get_market_capital_flow_overview",
        "Market-wide capital flow overview by sector/concept.",
        vec![ToolArgSpec::optional(
            "days_type",
            ArgKind::Number,
            "1, 5, or 10 day window",
        )],
        Arc::new(MarketCapitalFlowOverviewHandler {
            registry: providers.clone(),
            online_tools,
        }),
    ));
    tools.register(ToolDescriptor::new(
        "get_fundamentals_report",
        "Fundamentals bundle for a ticker as of a given date.",
        vec![
            ToolArgSpec::required("ticker", ArgKind::Ticker, "ticker symbol"),
            ToolArgSpec::required("as_of_date", ArgKind::String, "YYYY-MM-DD"),
        ],
        Arc::new(FundamentalsHandler {
            registry: providers.clone(),
            online_tools,
        }),
    ));
    tools.register(ToolDescriptor::new(
        "get_dividend_history",
        "Dividend history for a ticker, optionally bounded by year.",
        vec![
            ToolArgSpec::required("ticker", ArgKind::Ticker, "ticker symbol"),
            ToolArgSpec::optional("start_year", ArgKind::Number, "inclusive start year"),
            ToolArgSpec::optional("end_year", ArgKind::Number, "inclusive end year"),
        ],
        Arc::new(DividendHistoryHandler {
            registry: providers.clone(),
            online_tools,
        }),
    ));
    tools.register(ToolDescriptor::new(
        "get_stock_news",
        "Recent news items for a ticker as of a given date.",
        vec![
            ToolArgSpec::required("ticker", ArgKind::Ticker, "ticker symbol"),
            ToolArgSpec::required("as_of_date", ArgKind::String, "YYYY-MM-DD"),
        ],
        Arc::new(NewsHandler {
            registry: providers.clone(),
            online_tools,
        }),
    ));
    tools.register(ToolDescriptor::new(
        "get_social_sentiment_data",
        "Recent news/social mentions for a ticker, read for sentiment rather than headlines.",
        vec![
            ToolArgSpec::required("ticker", ArgKind::Ticker, "ticker symbol"),
            ToolArgSpec::required("as_of_date", ArgKind::String, "YYYY-MM-DD"),
        ],
        Arc::new(NewsHandler {
            registry: providers,
            online_tools,
        }),
    ));

    tools.assign_to_role(AnalystRole::Market, "get_stock_market_data_unified");
    tools.assign_to_role(AnalystRole::Market, "get_capital_flow_analysis");
    tools.assign_to_role(AnalystRole::Market, "get_market_capital_flow_overview");
    tools.assign_to_role(AnalystRole::Fundamentals, "get_fundamentals_report");
    tools.assign_to_role(AnalystRole::Fundamentals, "get_dividend_history");
    tools.assign_to_role(AnalystRole::News, "get_stock_news");
    tools.assign_to_role(AnalystRole::Social, "get_social_sentiment_data");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryBackend;
    use crate::cache::CacheManager;
    use crate::providers::mock::MockProvider;
    use crate::retry::breaker::BreakerRegistry;
    use crate::retry::monitor::ErrorMonitor;
    use crate::market::Market;

    fn fresh_providers() -> Arc<ProviderRegistry> {
        let cache = Arc::new(CacheManager::new(Arc::new(MemoryBackend::new(10)), vec![]));
        let breakers = Arc::new(BreakerRegistry::new(Default::default()));
        let monitor = Arc::new(ErrorMonitor::new(10));
        Arc::new(ProviderRegistry::new(cache, breakers, monitor))
    }

    #[test]
    fn install_default_toolset_wires_expected_roles() {
        let providers = fresh_providers();
        let mut tools = ToolRegistry::new();
        install_default_toolset(&mut tools, providers, true);

        assert_eq!(tools.toolset_for(AnalystRole::Market).len(), 3);
        assert_eq!(tools.toolset_for(AnalystRole::Fundamentals).len(), 2);
        assert_eq!(tools.toolset_for(AnalystRole::News).len(), 1);
        assert_eq!(tools.toolset_for(AnalystRole::Social).len(), 1);
        assert_eq!(
            tools.primary_tool_for(AnalystRole::Market),
            Some("get_stock_market_data_unified")
        );
    }

    #[tokio::test]
    async fn stock_history_handler_round_trips_through_provider() {
        let mut providers = ProviderRegistry::new(
            Arc::new(CacheManager::new(Arc::new(MemoryBackend::new(10)), vec![])),
            Arc::new(BreakerRegistry::new(Default::default())),
            Arc::new(ErrorMonitor::new(10)),
        );
        providers.register(
            Capability::StockHistory,
            Arc::new(MockProvider::value("p", &[Market::Us], serde_json::json!([1, 2]))),
        );
        let handler = StockHistoryHandler {
            registry: Arc::new(providers),
            online_tools: true,
        };
        let args = serde_json::json!({"ticker": "AAPL", "start_date": "2024-01-01", "end_date": "2024-02-01"})
            .as_object()
            .unwrap()
            .clone();
        let result = handler.call(args).await.unwrap();
        assert_eq!(result, "[1,2]");
    }
}
