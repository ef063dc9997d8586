//! Pure, deterministic ticker classification (spec §4.C).

use std::sync::LazyLock;

use regex::Regex;

use super::{Classification, Market};
use crate::error::CoreError;

static CN_A: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}$").unwrap());
static HK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(\d{4,5})(\.HK)?$").unwrap());
static US: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]{1,5}$").unwrap());

/// Classify a raw ticker into its market, normalized form and currency.
///
/// Deterministic and side-effect free; callers (the provider registry,
/// analyst nodes, and the tool dispatcher's arg validation) all share this
/// single implementation so routing decisions never diverge.
pub fn classify(raw: &str) -> Result<Classification, CoreError> {
    let trimmed = raw.trim();

    if CN_A.is_match(trimmed) {
        return Ok(Classification {
            market: Market::CnA,
            normalized_ticker: trimmed.to_string(),
            currency_code: Market::CnA.currency_code().to_string(),
        });
    }

    if let Some(caps) = HK.captures(trimmed) {
        let digits = &caps[1];
        let normalized = format!("{digits}.HK");
        return Ok(Classification {
            market: Market::Hk,
            normalized_ticker: normalized,
            currency_code: Market::Hk.currency_code().to_string(),
        });
    }

    if US.is_match(trimmed) {
        return Ok(Classification {
            market: Market::Us,
            normalized_ticker: trimmed.to_uppercase(),
            currency_code: Market::Us.currency_code().to_string(),
        });
    }

    Err(CoreError::InvalidTicker(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_cn_a() {
        let c = classify("002115").unwrap();
        assert_eq!(c.market, Market::CnA);
        assert_eq!(c.normalized_ticker, "002115");
        assert_eq!(c.currency_code, "CNY");
    }

    #[test]
    fn classifies_hk_bare_digits() {
        let c = classify("00700").unwrap();
        assert_eq!(c.market, Market::Hk);
        assert_eq!(c.normalized_ticker, "00700.HK");
    }

    #[test]
    fn classifies_hk_with_suffix_case_insensitive() {
        let c = classify("0700.hk").unwrap();
        assert_eq!(c.market, Market::Hk);
        assert_eq!(c.normalized_ticker, "0700.HK");
    }

    #[test]
    fn classifies_us_lowercase() {
        let c = classify("aapl").unwrap();
        assert_eq!(c.market, Market::Us);
        assert_eq!(c.normalized_ticker, "AAPL");
        assert_eq!(c.currency_code, "USD");
    }

    #[test]
    fn rejects_three_digit_ticker() {
        assert!(matches!(classify("700"), Err(CoreError::InvalidTicker(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(classify("???").is_err());
        assert!(classify("").is_err());
    }

    #[test]
    fn classification_is_a_fixpoint_on_normalized_form() {
        for raw in ["002115", "00700", "0700.HK", "aapl", "MSFT"] {
            let first = classify(raw).unwrap();
            let second = classify(&first.normalized_ticker).unwrap();
            assert_eq!(first.market, second.market);
        }
    }
}
