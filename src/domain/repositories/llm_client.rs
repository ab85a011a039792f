//! LLM Client trait (spec §4.4).
//!
//! A chat-completion invocation with model fallback on quota exhaustion.
//! The trait is deliberately thin — prompt construction lives in
//! `trading::trader`/`trading::scanner`/`trading::position_manager`, which
//! materialize all indicator/news/sentiment data before asking the model for
//! a recommendation (REDESIGN FLAGS §9: no tool-calling, the core does the
//! fetching).

use crate::domain::entities::recommendation::Recommendation;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LlmError {
    /// All models in the fallback list were quota-exhausted in one `invoke`.
    #[error("quota exhausted across all fallback models")]
    QuotaExhausted,

    #[error("network error: {0}")]
    Network(String),

    #[error("could not parse a recommendation out of the model's response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub recommendation: Recommendation,
    pub reason: String,
    /// Any extra fields the prompt asked for (trend_timeframe, sentiment_score, ...).
    pub raw: serde_json::Value,
}

/// Strip a leading/trailing fenced code block (```` ```json ```` or ` ``` `)
/// before JSON-decoding, matching the original analyst's response cleanup.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let without_leading = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .trim_start();
    without_leading.strip_suffix("```").unwrap_or(without_leading).trim()
}

pub fn parse_response(response: &str) -> Result<LlmResponse, LlmError> {
    let cleaned = strip_code_fence(response);
    let value: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(e.to_string()))?;

    let recommendation_raw = value
        .get("recommendation")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LlmError::Parse("missing `recommendation` field".to_string()))?;
    let recommendation = Recommendation::parse(recommendation_raw)
        .ok_or_else(|| LlmError::Parse(format!("unknown recommendation: {recommendation_raw}")))?;
    let reason = value
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(LlmResponse {
        recommendation,
        reason,
        raw: value,
    })
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Invoke the active model; on quota exhaustion, rotates through the
    /// fallback list internally up to `len(models)` attempts.
    async fn invoke(&self, prompt: &str) -> Result<LlmResponse, LlmError>;

    /// Rebuild the ordered model list from Settings and reset `active_index=0`.
    async fn reconfigure(&self, models: Vec<String>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let wrapped = "```json\n{\"recommendation\":\"AL\"}\n```";
        assert_eq!(strip_code_fence(wrapped), "{\"recommendation\":\"AL\"}");
    }

    #[test]
    fn strips_bare_fence() {
        let wrapped = "```\n{\"recommendation\":\"AL\"}\n```";
        assert_eq!(strip_code_fence(wrapped), "{\"recommendation\":\"AL\"}");
    }

    #[test]
    fn parses_clean_response() {
        let raw = r#"{"recommendation":"AL","reason":"oversold bounce"}"#;
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.recommendation, Recommendation::Buy);
        assert_eq!(parsed.reason, "oversold bounce");
    }

    #[test]
    fn rejects_unknown_recommendation() {
        let raw = r#"{"recommendation":"MAYBE"}"#;
        assert!(parse_response(raw).is_err());
    }
}
