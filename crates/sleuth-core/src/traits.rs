//! Trait definitions for the kubesleuth investigation loop.
//!
//! These four traits are the seams the loop is built on:
//!
//! - `CompletionService` is the external text-completion collaborator
//! - `Tool` is a named diagnostic capability, only ever run through the registry
//! - `ApprovalGate` decides whether a proposed action may run
//! - `ExecutionLog` is the write-only per-iteration audit sink
//!
//! `AgentLoop` wires them together. A `Tool` is never called unless the
//! approval gate first returns `Approved`.

use serde_json::{Map, Value};

use sleuth_contracts::{
    approval::ApprovalOutcome,
    decision::Action,
    error::{CompletionError, SleuthResult, ToolError},
    execution::{IterationRecord, Terminal},
    state::SessionId,
    tool::{ToolContext, ToolResult},
};

/// The external text-completion service.
///
/// Implementations are free to retry internally. Whatever they return is
/// final from the loop's perspective; the loop never blindly re-invokes.
pub trait CompletionService: Send + Sync {
    /// Produce raw model text for the given prompt pair.
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, CompletionError>;

    /// Short provider/model label for logs.
    fn name(&self) -> &str {
        "completion"
    }
}

/// A named diagnostic capability.
///
/// A tool sees only its parameters and a `ToolContext`; it never touches the
/// investigation state. Errors returned here never reach the loop as errors:
/// the registry turns them into a failed `ToolResult`.
pub trait Tool: Send + Sync {
    /// Unique, immutable registry key.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the parameter map, shown to the model.
    fn parameters_schema(&self) -> Value {
        Value::Object(Map::new())
    }

    fn required_permissions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Dangerous tools always go to a human, whatever the safe set says.
    fn is_dangerous(&self) -> bool {
        false
    }

    /// Check the parameter map before `execute` is called.
    fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError>;

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Decides whether a proposed action may run.
///
/// `Err` is reserved for a broken approval channel; a human saying no is an
/// `Ok(Rejected)` or `Ok(Aborted)`.
pub trait ApprovalGate: Send + Sync {
    fn authorize(&self, action: &Action) -> SleuthResult<ApprovalOutcome>;
}

/// The write-only execution log.
///
/// Exactly one `IterationRecord` is written per iteration. A failed write is
/// fatal: the run ends with `Terminal::FatalError`.
pub trait ExecutionLog: Send + Sync {
    /// Append one iteration record. Records are never modified afterwards.
    fn record(&self, record: &IterationRecord) -> SleuthResult<()>;

    /// Mark a session as finished. Implementations may flush or seal here.
    fn finalize(&self, session_id: &SessionId, terminal: &Terminal) -> SleuthResult<()>;
}
