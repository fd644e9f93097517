//! OpenAI-compatible chat completions client.
//!
//! Works with OpenAI and any server exposing `/chat/completions` in the same
//! shape (vLLM, Ollama, Azure-style gateways) via `base_url`.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use sleuth_contracts::error::{CompletionError, SleuthResult};
use sleuth_core::{config::optional_secs, traits::CompletionService};

use crate::{
    config::LlmConfig,
    http::{build_client, classify_transport, read_json, RetryPolicy},
};

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> SleuthResult<Self> {
        Ok(Self {
            http: build_client(config)?,
            api_key: api_key.into(),
            model: config.model().to_string(),
            endpoint: format!("{}/chat/completions", config.base_url()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: optional_secs(config.timeout_secs),
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, system: &'a str, user: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn attempt(&self, body: &ChatRequest<'_>) -> Result<String, CompletionError> {
        let mut request = self.http.post(&self.endpoint).json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request
            .send()
            .map_err(|e| classify_transport(PROVIDER, self.timeout, e))?;
        extract_content(&read_json(PROVIDER, response)?)
    }
}

impl CompletionService for OpenAiClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = self.request(system, user);
        debug!(model = %self.model, user_chars = user.len(), "sending chat completion request");
        let text = self.retry.run(PROVIDER, || self.attempt(&body))?;
        debug!(model = %self.model, response_chars = text.len(), "received chat completion");
        Ok(text)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// `choices[0].message.content`, trimmed. Empty content counts as a failure.
fn extract_content(body: &Value) -> Result<String, CompletionError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(CompletionError::Unavailable(
            "openai returned no message content".to_string(),
        ));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_carries_both_roles_and_sampling_settings() {
        let config = LlmConfig::default();
        let client = OpenAiClient::new(&config, "sk-test").unwrap();
        let body = serde_json::to_value(client.request("be terse", "why?")).unwrap();

        assert_eq!(body["model"], json!("gpt-4-turbo-preview"));
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be terse"}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "why?"}));
        assert_eq!(body["max_tokens"], json!(3000));
        assert_eq!(body["temperature"], json!(0.5));
    }

    #[test]
    fn endpoint_follows_base_url() {
        let config = LlmConfig {
            base_url: Some("http://localhost:8000/v1/".to_string()),
            model: Some("llama3".to_string()),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(&config, "").unwrap();
        assert_eq!(client.endpoint, "http://localhost:8000/v1/chat/completions");
        assert_eq!(client.model(), "llama3");
    }

    #[test]
    fn content_is_extracted_and_trimmed() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "  {\"type\": \"action\"}\n"}}]});
        assert_eq!(extract_content(&body).unwrap(), "{\"type\": \"action\"}");
    }

    #[test]
    fn missing_or_empty_content_is_recoverable() {
        for body in [json!({"choices": []}), json!({"choices": [{"message": {"content": "  "}}]})] {
            let err = extract_content(&body).unwrap_err();
            assert!(err.is_recoverable(), "{err:?}");
        }
    }
}
