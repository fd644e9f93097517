//! Shared HTTP plumbing: client construction, status classification, and
//! the rate-limit retry loop.

use std::{thread, time::Duration};

use reqwest::blocking::{Client, Response};
use tracing::warn;

use sleuth_contracts::error::{CompletionError, SleuthError, SleuthResult};
use sleuth_core::config::optional_secs;

use crate::config::LlmConfig;

pub(crate) fn build_client(config: &LlmConfig) -> SleuthResult<Client> {
    Client::builder()
        .timeout(optional_secs(config.timeout_secs))
        .build()
        .map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to create HTTP client: {e}"),
        })
}

/// Map a non-success HTTP status onto the completion error taxonomy.
///
/// 429 is retried by `RetryPolicy`. Other client errors are fatal and server
/// errors are recoverable.
pub(crate) fn classify_status(provider: &str, status: u16, body: &str) -> CompletionError {
    let body = body.trim();
    match status {
        429 => CompletionError::RateLimited { retries: 0 },
        401 | 403 => CompletionError::Fatal(format!(
            "{provider} rejected the credentials ({status}): {body}"
        )),
        400..=499 => CompletionError::Fatal(format!("{provider} API error ({status}): {body}")),
        _ => CompletionError::Unavailable(format!("{provider} API error ({status}): {body}")),
    }
}

pub(crate) fn classify_transport(
    provider: &str,
    timeout: Option<Duration>,
    error: reqwest::Error,
) -> CompletionError {
    match timeout {
        Some(limit) if error.is_timeout() => CompletionError::Timeout(limit),
        _ => CompletionError::Unavailable(format!("{provider} request failed: {error}")),
    }
}

/// Read a response body as JSON, classifying failures.
pub(crate) fn read_json(provider: &str, response: Response) -> Result<serde_json::Value, CompletionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(classify_status(provider, status.as_u16(), &body));
    }
    response
        .json()
        .map_err(|e| CompletionError::Unavailable(format!("{provider} returned an unreadable body: {e}")))
}

/// Retry on `RateLimited`, sleeping `delay` between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            delay: config.retry_delay(),
        }
    }

    /// Run `attempt` until it succeeds, fails with anything other than
    /// `RateLimited`, or `max_retries` attempts have been rate limited.
    pub fn run<F>(&self, provider: &str, mut attempt: F) -> Result<String, CompletionError>
    where
        F: FnMut() -> Result<String, CompletionError>,
    {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(CompletionError::RateLimited { .. }) => {
                    retries += 1;
                    if retries >= self.max_retries {
                        warn!(provider, retries, "rate limit persisted; giving up");
                        return Err(CompletionError::RateLimited { retries });
                    }
                    warn!(
                        provider,
                        retries,
                        max_retries = self.max_retries,
                        delay_secs = self.delay.as_secs(),
                        "rate limit exceeded; retrying"
                    );
                    thread::sleep(self.delay);
                }
                other => return other,
            }
        }
    }
}
