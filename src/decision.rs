//! Decision Envelope (spec §4.I): the structured artifact parsed out of
//! `state.final_trade_decision` by keyword scan, not model-assisted —
//! the model's job ends at producing that text.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::state::AgentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub confidence: f64,
    pub target_price: Option<f64>,
    pub reasoning: String,
}

/// Parses the Decision Envelope out of `state.final_trade_decision` (spec
/// §4.I). Never fails: an empty or unparseable decision text degrades to
/// `HOLD` with the default confidence and whatever text is available as
/// `reasoning`, honoring §8 property 12 ("every successful run returns
/// … a non-empty reasoning").
pub fn parse_decision(state: &AgentState) -> Decision {
    let text = if state.final_trade_decision.trim().is_empty() {
        state.risk_assessment.as_str()
    } else {
        state.final_trade_decision.as_str()
    };

    Decision {
        action: parse_action(text),
        confidence: parse_confidence(text).unwrap_or(0.5),
        target_price: parse_target_price(text),
        reasoning: final_paragraph(text),
    }
}

fn parse_action(text: &str) -> Action {
    let tag_re = Regex::new(r"(?i)FINAL TRANSACTION PROPOSAL:\s*\*{0,2}(BUY|HOLD|SELL)\*{0,2}").unwrap();
    if let Some(caps) = tag_re.captures(text) {
        return action_from_word(&caps[1]);
    }

    let paragraph = final_paragraph(text);
    let word_re = Regex::new(r"(?i)\b(BUY|HOLD|SELL)\b").unwrap();
    if let Some(caps) = word_re.captures(&paragraph) {
        return action_from_word(&caps[1]);
    }

    Action::Hold
}

fn action_from_word(word: &str) -> Action {
    match word.to_ascii_uppercase().as_str() {
        "BUY" => Action::Buy,
        "SELL" => Action::Sell,
        _ => Action::Hold,
    }
}

fn parse_confidence(text: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)confidence\D{0,10}?(\d+(?:\.\d+)?)\s*%?").unwrap();
    let caps = re.captures(text)?;
    let raw: f64 = caps[1].parse().ok()?;
    let normalized = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(normalized.clamp(0.0, 1.0))
}

fn parse_target_price(text: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)target\s*price\D{0,10}?[^\d\-]*(-?\d+(?:\.\d+)?)").unwrap();
    let caps = re.captures(text)?;
    caps[1].parse().ok()
}

/// The final non-empty paragraph of `text`, split on blank lines (spec
/// §4.I "the final paragraph of state.final_trade_decision").
fn final_paragraph(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .next_back()
        .unwrap_or(text.trim())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_decision(text: &str) -> AgentState {
        let mut state = AgentState::new("r1", "AAPL", "2024-05-10");
        state.final_trade_decision = text.to_string();
        state
    }

    #[test]
    fn explicit_tag_wins_over_paragraph_keywords() {
        let state = state_with_decision("Some SELL mention earlier.\n\nFINAL TRANSACTION PROPOSAL: **BUY**\nGo for it.");
        assert_eq!(parse_decision(&state).action, Action::Buy);
    }

    #[test]
    fn first_keyword_in_final_paragraph_used_without_tag() {
        let state = state_with_decision("Market looks shaky.\n\nOverall we recommend SELL given the risk profile.");
        assert_eq!(parse_decision(&state).action, Action::Sell);
    }

    #[test]
    fn defaults_to_hold_with_default_confidence_when_silent() {
        let state = state_with_decision("Observe market conditions further.");
        let decision = parse_decision(&state);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.5);
        assert!(decision.target_price.is_none());
    }

    #[test]
    fn confidence_percentage_is_normalized() {
        let state = state_with_decision("FINAL TRANSACTION PROPOSAL: **BUY**\nConfidence: 82%.");
        assert!((parse_decision(&state).confidence - 0.82).abs() < 1e-9);
    }

    #[test]
    fn target_price_is_parsed_currency_agnostically() {
        let state = state_with_decision("FINAL TRANSACTION PROPOSAL: **BUY**\nTarget price: $195.50.");
        assert_eq!(parse_decision(&state).target_price, Some(195.50));
    }

    #[test]
    fn reasoning_is_never_empty_for_nonempty_decision_text() {
        let state = state_with_decision("FINAL TRANSACTION PROPOSAL: **HOLD**\nStay put for now.");
        assert!(!parse_decision(&state).reasoning.is_empty());
    }
}
