//! Error types for the kubesleuth investigation loop.
//!
//! `SleuthError` is the unified error returned by fallible operations across
//! the workspace. Two narrower enums cross trait seams on their own:
//!
//! - `ToolError` is what a `Tool` returns. The registry never lets it escape;
//!   it is always folded into a failed `ToolResult`.
//! - `CompletionError` is what a text-completion service returns. The loop
//!   decides from the variant whether the run can continue.

use std::time::Duration;

use thiserror::Error;

/// The unified error type for kubesleuth.
#[derive(Debug, Error)]
pub enum SleuthError {
    /// The model's output had no parseable structured block, or the block did
    /// not match either decision shape.
    #[error("malformed model response: {reason}")]
    MalformedResponse {
        reason: String,
        /// The offending text, kept for diagnostics.
        raw: String,
    },

    /// No tool is registered under the requested name.
    #[error("tool '{name}' is not registered")]
    ToolNotFound { name: String },

    /// A tool with this name is already registered.
    #[error("tool '{name}' is already registered")]
    AlreadyRegistered { name: String },

    /// The registration does not satisfy the tool contract.
    #[error("invalid tool '{name}': {reason}")]
    InvalidTool { name: String, reason: String },

    /// The prompt could not be rendered, or rendered empty.
    #[error("prompt construction failed: {reason}")]
    PromptError { reason: String },

    /// The human approval channel failed outside of the normal answer set.
    #[error("approval failed: {reason}")]
    ApprovalFailed { reason: String },

    /// The execution log could not persist an iteration record.
    ///
    /// Treated as fatal: an iteration that cannot be recorded cannot proceed.
    #[error("execution log write failed: {reason}")]
    ExecutionLogFailed { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The text-completion service failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Convenience alias used throughout the kubesleuth crates.
pub type SleuthResult<T> = Result<T, SleuthError>;

/// Failure raised by a tool's `validate` or `execute`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The tool could not be initialized (missing binary, bad config, ...).
    #[error("tool unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// Failure reported by a text-completion service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// Transient failure: network, 5xx, unreadable response body.
    #[error("completion service unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within its deadline.
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    /// Rate limiting persisted through every retry.
    #[error("completion service rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    /// Not worth retrying: rejected credentials, unknown model, bad request.
    #[error("completion service rejected the request: {0}")]
    Fatal(String),
}

impl CompletionError {
    /// True when the loop may continue by feeding the failure back to the
    /// next prompt.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CompletionError::Fatal(_))
    }
}
