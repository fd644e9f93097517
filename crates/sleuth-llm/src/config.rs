//! Completion provider configuration (`[llm]` table).
//!
//! API keys are never read from the file. They come from `OPENAI_API_KEY`
//! or `GOOGLE_API_KEY` when the client is built.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use sleuth_contracts::error::SleuthError;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GOOGLE_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => f.write_str("openai"),
            Provider::Gemini => f.write_str("gemini"),
        }
    }
}

impl FromStr for Provider {
    type Err = SleuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            other => Err(SleuthError::ConfigError {
                reason: format!("invalid LLM provider '{other}'; must be 'openai' or 'gemini'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    /// Provider default when absent.
    pub model: Option<String>,
    /// Provider default when absent. Point at any OpenAI-compatible server.
    pub base_url: Option<String>,
    /// HTTP timeout per request. `0` disables it.
    pub timeout_secs: u64,
    /// Attempts made while the provider answers 429.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: None,
            base_url: None,
            timeout_secs: 120,
            max_retries: 3,
            retry_delay_secs: 5,
            max_tokens: 3000,
            temperature: 0.5,
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, Provider::OpenAi) => DEFAULT_OPENAI_MODEL,
            (None, Provider::Gemini) => DEFAULT_GEMINI_MODEL,
        }
    }

    pub fn base_url(&self) -> &str {
        let url = match (&self.base_url, self.provider) {
            (Some(url), _) => url.as_str(),
            (None, Provider::OpenAi) => DEFAULT_OPENAI_BASE_URL,
            (None, Provider::Gemini) => DEFAULT_GEMINI_BASE_URL,
        };
        url.trim_end_matches('/')
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
