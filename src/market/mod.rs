//! Ticker classification (spec §3, §4.C).

pub mod classifier;

pub use classifier::classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    #[serde(rename = "CN-A")]
    CnA,
    Hk,
    Us,
}

impl Market {
    pub fn currency_code(self) -> &'static str {
        match self {
            Market::CnA => "CNY",
            Market::Hk => "HKD",
            Market::Us => "USD",
        }
    }
}

/// Result of classifying a raw ticker string.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Classification {
    pub market: Market,
    pub normalized_ticker: String,
    pub currency_code: String,
}
