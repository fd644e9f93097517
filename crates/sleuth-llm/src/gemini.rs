//! Google Gemini `generateContent` client.
//!
//! Gemini takes a single text turn here, so the system and user prompts are
//! joined as `"{system}\n\nUser Query: {user}"`.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use sleuth_contracts::error::{CompletionError, SleuthResult};
use sleuth_core::{config::optional_secs, traits::CompletionService};

use crate::{
    config::LlmConfig,
    http::{build_client, classify_transport, read_json, RetryPolicy},
};

const PROVIDER: &str = "gemini";

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> SleuthResult<Self> {
        let model = config.model().to_string();
        Ok(Self {
            http: build_client(config)?,
            api_key: api_key.into(),
            endpoint: format!("{}/models/{}:generateContent", config.base_url(), model),
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: optional_secs(config.timeout_secs),
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, system: &str, user: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": format!("{system}\n\nUser Query: {user}")}]
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature
            }
        })
    }

    fn attempt(&self, body: &Value) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| classify_transport(PROVIDER, self.timeout, e))?;
        extract_text(&read_json(PROVIDER, response)?)
    }
}

impl CompletionService for GeminiClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = self.request(system, user);
        debug!(model = %self.model, user_chars = user.len(), "sending generateContent request");
        self.retry.run(PROVIDER, || self.attempt(&body))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// Concatenate the text parts of the first candidate.
///
/// A prompt blocked by safety filters is fatal: the provider refuses the
/// request itself.
fn extract_text(body: &Value) -> Result<String, CompletionError> {
    if let Some(reason) = body
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        warn!(block_reason = reason, "gemini blocked the prompt");
        return Err(CompletionError::Fatal(format!("gemini blocked prompt: {reason}")));
    }

    let text: String = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(CompletionError::Unavailable(
            "gemini returned no candidate text".to_string(),
        ));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    fn config() -> LlmConfig {
        LlmConfig {
            provider: Provider::Gemini,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn prompts_are_joined_into_one_turn() {
        let client = GeminiClient::new(&config(), "key").unwrap();
        let body = client.request("SYSTEM", "why is web down?");
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            json!("SYSTEM\n\nUser Query: why is web down?")
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(3000));
    }

    #[test]
    fn endpoint_names_the_model() {
        let client = GeminiClient::new(&config(), "key").unwrap();
        assert_eq!(client.model(), "gemini-pro");
        assert!(client
            .endpoint
            .ends_with("/v1beta/models/gemini-pro:generateContent"));
    }

    #[test]
    fn parts_are_concatenated() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"type\": "}, {"text": "\"final_answer\"}"}]}}]
        });
        assert_eq!(extract_text(&body).unwrap(), "{\"type\": \"final_answer\"}");
    }

    #[test]
    fn blocked_prompt_is_fatal() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(matches!(extract_text(&body), Err(CompletionError::Fatal(_))));
    }

    #[test]
    fn no_candidates_is_recoverable() {
        let err = extract_text(&json!({"candidates": []})).unwrap_err();
        assert!(err.is_recoverable());
    }
}
