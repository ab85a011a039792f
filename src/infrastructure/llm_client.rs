//! Gemini-backed `LlmClient` (spec §4.4).
//!
//! Request shape follows the same `reqwest::Client` + serde-DTO pattern as
//! `exchange_adapter`; the venue-specific part is the model fallback: each
//! `invoke` walks the configured model list starting from whichever model
//! last succeeded, rotating past quota/network failures. A full rotation
//! with no success logs at CRITICAL and returns
//! `LlmError::QuotaExhausted` rather than looping forever — see
//! SPEC_FULL.md §D for why this differs from the original's unconditional
//! retry loop.

use crate::domain::repositories::llm_client::{parse_response, LlmClient, LlmError, LlmResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
}

impl GeminiConfig {
    pub fn new(api_key: &str) -> Self {
        Self { api_base: GEMINI_API_BASE.to_string(), api_key: api_key.to_string() }
    }
}

pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
    models: RwLock<Vec<String>>,
    active_index: AtomicUsize,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, models: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("gemini-trading-agent/0.1.0")
            .build()
            .expect("failed to build the LLM HTTP client");

        Self { client, config, models: RwLock::new(models), active_index: AtomicUsize::new(0) }
    }

    async fn call_model(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.api_base, model, self.config.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(format!("invalid response body: {e}")))?;

        if status == 429 || status == 503 {
            return Err(LlmError::QuotaExhausted);
        }
        if !status.is_success() {
            let message = payload
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("request failed");
            if message.to_lowercase().contains("quota") || message.to_lowercase().contains("resource") {
                return Err(LlmError::QuotaExhausted);
            }
            return Err(LlmError::Network(message.to_string()));
        }

        payload
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("response had no candidate text".to_string()))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn invoke(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        let models = self.models.read().await;
        if models.is_empty() {
            return Err(LlmError::Network("no LLM models configured".to_string()));
        }

        let start = self.active_index.load(Ordering::Relaxed) % models.len();
        for step in 0..models.len() {
            let idx = (start + step) % models.len();
            // Advancing past the end of the list wraps back to index 0
            // (spec §4.4 step 2); that wrap itself is the CRITICAL event,
            // not just the eventual exhaustion of the retry budget below.
            if step > 0 && idx == 0 {
                error!(model_count = models.len(), "CRITICAL: LLM model fallback list wrapped back to the primary model");
            }
            let model = &models[idx];
            match self.call_model(model, prompt).await {
                Ok(text) => {
                    self.active_index.store(idx, Ordering::Relaxed);
                    return parse_response(&text);
                }
                Err(LlmError::QuotaExhausted) => {
                    warn!(model, "model quota exhausted, rotating to next fallback");
                    continue;
                }
                // Non-quota errors propagate immediately (spec §4.4) rather
                // than being treated as a reason to rotate models.
                Err(e) => return Err(e),
            }
        }

        warn!(model_count = models.len(), "exhausted every fallback model in one rotation, failing this invocation (SPEC_FULL.md §D resolution 3)");
        Err(LlmError::QuotaExhausted)
    }

    async fn reconfigure(&self, models: Vec<String>) {
        let mut guard = self.models.write().await;
        *guard = models;
        self.active_index.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reconfigure_resets_active_index() {
        let client = GeminiClient::new(
            GeminiConfig::new("key"),
            vec!["gemini-1.5-flash".to_string(), "gemini-1.5-pro".to_string()],
        );
        client.active_index.store(1, Ordering::Relaxed);
        client.reconfigure(vec!["gemini-2.0-flash".to_string()]).await;
        assert_eq!(client.active_index.load(Ordering::Relaxed), 0);
        assert_eq!(*client.models.read().await, vec!["gemini-2.0-flash".to_string()]);
    }

    #[tokio::test]
    async fn invoke_reports_network_error_when_no_models_configured() {
        let client = GeminiClient::new(GeminiConfig::new("key"), vec![]);
        let result = client.invoke("hello").await;
        assert!(matches!(result, Err(LlmError::Network(_))));
    }
}
