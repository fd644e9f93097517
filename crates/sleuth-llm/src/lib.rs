//! # sleuth-llm
//!
//! Text-completion clients implementing
//! [`CompletionService`](sleuth_core::traits::CompletionService):
//!
//! - [`OpenAiClient`] for OpenAI and OpenAI-compatible chat completion APIs
//! - [`GeminiClient`] for Google Gemini
//!
//! Both are synchronous (`reqwest::blocking`), retry while the provider
//! answers HTTP 429, and report failures through `CompletionError` so the
//! loop can tell recoverable failures from fatal ones.

pub mod config;
pub mod gemini;
pub mod http;
pub mod openai;

use std::sync::Arc;

use tracing::info;

use sleuth_contracts::error::{SleuthError, SleuthResult};
use sleuth_core::traits::CompletionService;

pub use config::{LlmConfig, Provider};
pub use gemini::GeminiClient;
pub use http::RetryPolicy;
pub use openai::OpenAiClient;

/// Build the configured provider's client.
///
/// `env` looks up the API key (`OPENAI_API_KEY` or `GOOGLE_API_KEY`); pass
/// `|k| std::env::var(k).ok()` in production.
///
/// # Errors
///
/// `ConfigError` if the key is missing or empty, or the HTTP client cannot
/// be created.
pub fn build_completion_service<F>(config: &LlmConfig, env: F) -> SleuthResult<Arc<dyn CompletionService>>
where
    F: Fn(&str) -> Option<String>,
{
    let key_var = config.provider.api_key_var();
    let api_key = env(key_var)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| SleuthError::ConfigError {
            reason: format!("{key_var} environment variable not set"),
        })?;

    info!(provider = %config.provider, model = %config.model(), "initializing completion client");
    let service: Arc<dyn CompletionService> = match config.provider {
        Provider::OpenAi => Arc::new(OpenAiClient::new(config, api_key)?),
        Provider::Gemini => Arc::new(GeminiClient::new(config, api_key)?),
    };
    Ok(service)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
