//! LLM scoring of individual signals.
//!
//! The [`Scorer`] trait is the seam between the deterministic pipeline
//! and the external language-model service. [`LlmScorer`] talks to a real
//! provider; tests substitute deterministic implementations.

pub mod llm;

pub use llm::LlmScorer;

use crate::models::{Criterion, CriterionScores, Market};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Longest signal text (in characters) included in a prompt.
const MAX_PROMPT_TEXT_CHARS: usize = 4000;

/// Per-signal scoring failure. Never fatal for the run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringError {
    #[error("signal has no text to score")]
    EmptyInput,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ScoringError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoringError::Transport(_) | ScoringError::Timeout(_) => true,
            ScoringError::Api { status, .. } => *status == 429 || *status >= 500,
            ScoringError::EmptyInput | ScoringError::InvalidResponse(_) => false,
        }
    }
}

/// Validated scorer output for one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResponse {
    pub scores: CriterionScores,
    pub title: String,
    pub description: String,
    pub evidence_quote: String,
}

/// Scores one signal's text for a market.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, market: Market, text: &str) -> Result<ScoreResponse, ScoringError>;

    /// Human-readable identifier, e.g. `anthropic/claude-sonnet-4-20250514`.
    fn name(&self) -> String;
}

/// Build the user prompt for a single signal.
pub fn build_prompt(market: Market, text: &str) -> String {
    let text: String = text.trim().chars().take(MAX_PROMPT_TEXT_CHARS).collect();

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Analyze this market signal from the {} market ({}).\n\n",
        market,
        market.as_str()
    ));
    prompt.push_str("=== SIGNAL ===\n");
    prompt.push_str(&text);
    prompt.push_str("\n=== END SIGNAL ===\n\n");
    prompt.push_str("Identify the single most important product or feature opportunity it points to, ");
    prompt.push_str("and score it from 0 to 100 on each criterion:\n");
    prompt.push_str("- charter_fit: alignment with the multilingual shopping experience charter for Hispanic and French-Canadian shoppers\n");
    prompt.push_str("- customer_evidence: strength of the customer pain point shown in the signal\n");
    prompt.push_str("- market_size: potential revenue impact\n");
    prompt.push_str("- feasibility: technical and operational feasibility\n");
    prompt.push_str("- competitive_advantage: differentiation versus competitors\n\n");
    prompt.push_str("Respond with ONLY this JSON object:\n");
    prompt.push_str(
        r#"{"charter_fit": 0, "customer_evidence": 0, "market_size": 0, "feasibility": 0, "competitive_advantage": 0, "opportunity_title": "5-10 word title", "opportunity_description": "Pain point and proposed solution", "evidence_quote": "Short quote from the signal"}"#,
    );
    prompt.push('\n');

    prompt
}

/// Parse and validate a model response.
pub fn parse_score_response(raw: &str) -> Result<ScoreResponse, ScoringError> {
    let json = extract_json_object(raw)?;

    let mut map = BTreeMap::new();
    for criterion in Criterion::ALL {
        let value = json
            .get(criterion.as_str())
            .ok_or_else(|| {
                ScoringError::InvalidResponse(format!("missing criterion {}", criterion.as_str()))
            })?
            .as_f64()
            .ok_or_else(|| {
                ScoringError::InvalidResponse(format!(
                    "criterion {} is not a number",
                    criterion.as_str()
                ))
            })?;
        map.insert(criterion, value);
    }

    let scores = CriterionScores::from_map(&map)
        .map_err(|gap| ScoringError::InvalidResponse(gap.to_string()))?;

    let title = text_field(&json, "opportunity_title");
    if title.is_empty() {
        return Err(ScoringError::InvalidResponse(
            "missing opportunity_title".to_string(),
        ));
    }

    Ok(ScoreResponse {
        scores,
        title,
        description: text_field(&json, "opportunity_description"),
        evidence_quote: text_field(&json, "evidence_quote"),
    })
}

fn text_field(json: &Value, key: &str) -> String {
    json[key].as_str().unwrap_or("").trim().to_string()
}

/// Parse the first balanced `{ ... }` in free text that is valid JSON.
///
/// Braces in surrounding prose, such as "a {0-100} scale", are skipped.
fn extract_json_object(text: &str) -> Result<Value, ScoringError> {
    let mut first_error = None;

    for (start, _) in text.match_indices('{') {
        let Some(candidate) = balanced_object_at(text, start) else {
            continue;
        };
        match serde_json::from_str::<Value>(candidate)
            .or_else(|_| serde_json::from_str::<Value>(&strip_trailing_commas(candidate)))
        {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(match first_error {
        Some(e) => ScoringError::InvalidResponse(format!("malformed JSON: {}", e)),
        None => ScoringError::InvalidResponse("no JSON object in response".to_string()),
    })
}

/// The balanced `{ ... }` starting at `start`, honouring JSON strings.
fn balanced_object_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Drop commas that directly precede a closing brace or bracket.
fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }

        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"charter_fit": 95, "customer_evidence": 85, "market_size": 90, "feasibility": 75, "competitive_advantage": 88, "opportunity_title": "Spanish Voice Search with Regional Accents", "opportunity_description": "Alexa misses Mexican Spanish accents", "evidence_quote": "I keep having to switch to English"}"#;

    #[test]
    fn test_parse_valid_response() {
        let parsed = parse_score_response(VALID).unwrap();
        assert_eq!(parsed.title, "Spanish Voice Search with Regional Accents");
        assert_eq!(parsed.scores.get(Criterion::CharterFit), 95.0);
        assert_eq!(parsed.scores.get(Criterion::CompetitiveAdvantage), 88.0);
        assert_eq!(parsed.evidence_quote, "I keep having to switch to English");
    }

    #[test]
    fn test_parse_response_wrapped_in_prose() {
        let raw = format!("Here is my analysis:\n```json\n{}\n```\nLet me know!", VALID);
        let parsed = parse_score_response(&raw).unwrap();
        assert_eq!(parsed.scores.get(Criterion::MarketSize), 90.0);
    }

    #[test]
    fn test_parse_response_after_braced_preamble() {
        let raw = format!("Each score uses a {{0-100}} scale:\n{}", VALID);
        let parsed = parse_score_response(&raw).unwrap();
        assert_eq!(parsed.title, "Spanish Voice Search with Regional Accents");
        assert_eq!(parsed.scores.get(Criterion::Feasibility), 75.0);

        let no_object = parse_score_response("Scores use {0-100} and {high, low}.");
        assert!(matches!(no_object, Err(ScoringError::InvalidResponse(msg)) if msg.starts_with("malformed JSON")));
    }

    #[test]
    fn test_parse_response_with_trailing_comma() {
        let raw = r#"{"charter_fit": 70, "customer_evidence": 60, "market_size": 50, "feasibility": 40, "competitive_advantage": 30, "opportunity_title": "Quebec French copy, {not} France French",}"#;
        let parsed = parse_score_response(raw).unwrap();
        assert_eq!(parsed.title, "Quebec French copy, {not} France French");
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn test_parse_rejects_missing_criterion() {
        let raw = r#"{"charter_fit": 70, "customer_evidence": 60, "market_size": 50, "feasibility": 40, "opportunity_title": "x"}"#;
        assert_eq!(
            parse_score_response(raw),
            Err(ScoringError::InvalidResponse(
                "missing criterion competitive_advantage".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range_and_non_numeric() {
        let out_of_range = VALID.replace("\"charter_fit\": 95", "\"charter_fit\": 120");
        assert!(matches!(
            parse_score_response(&out_of_range),
            Err(ScoringError::InvalidResponse(_))
        ));

        let non_numeric = VALID.replace("\"feasibility\": 75", "\"feasibility\": \"high\"");
        assert!(matches!(
            parse_score_response(&non_numeric),
            Err(ScoringError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_title_and_garbage() {
        let no_title = VALID.replace(
            "\"opportunity_title\": \"Spanish Voice Search with Regional Accents\"",
            "\"opportunity_title\": \"  \"",
        );
        assert!(parse_score_response(&no_title).is_err());
        assert!(parse_score_response("I cannot help with that.").is_err());
        assert!(parse_score_response("{\"charter_fit\": ").is_err());
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(Market::FrenchCanadian, "  Bill 96 et le commerce en ligne  ");
        assert!(prompt.contains("French-Canadian"));
        assert!(prompt.contains("Bill 96 et le commerce en ligne\n"));
        for criterion in Criterion::ALL {
            assert!(prompt.contains(criterion.as_str()));
        }

        let long = "a".repeat(MAX_PROMPT_TEXT_CHARS + 100);
        let prompt = build_prompt(Market::Hispanic, &long);
        assert!(!prompt.contains(&"a".repeat(MAX_PROMPT_TEXT_CHARS + 1)));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ScoringError::Timeout(30).is_retryable());
        assert!(ScoringError::Transport("reset".to_string()).is_retryable());
        assert!(ScoringError::Api { status: 529, body: String::new() }.is_retryable());
        assert!(ScoringError::Api { status: 429, body: String::new() }.is_retryable());
        assert!(!ScoringError::Api { status: 401, body: String::new() }.is_retryable());
        assert!(!ScoringError::InvalidResponse("bad".to_string()).is_retryable());
        assert!(!ScoringError::EmptyInput.is_retryable());
    }
}
