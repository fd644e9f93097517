//! Per-iteration execution records and the final investigation report.
//!
//! `IterationRecord` is what gets written to the execution log, one per
//! iteration. `InvestigationReport` is what a loop run returns to its caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    approval::ApprovalOutcome,
    decision::{Decision, FinalAnswer},
    state::{Interaction, SessionId},
    tool::ToolResult,
};

/// The exact text sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IterationOutcome {
    /// The completion service failed; the run continues with feedback.
    CompletionFailed { error: String },
    /// The model output could not be interpreted; the run continues.
    Malformed { error: String },
    /// The model produced a final answer.
    Answered,
    /// A tool ran (successfully or not).
    ToolExecuted { result: ToolResult },
    /// The approval gate did not approve the action.
    ApprovalDenied { outcome: ApprovalOutcome },
    /// The run ended abnormally during this iteration.
    Fatal { message: String },
}

/// One execution log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub session_id: SessionId,
    /// 1-based iteration number.
    pub iteration: u32,
    /// Absent only when the prompt could not be rendered.
    pub prompt: Option<RenderedPrompt>,
    /// Absent when the completion service produced nothing.
    pub raw_output: Option<String>,
    pub decision: Option<Decision>,
    pub outcome: IterationOutcome,
    pub timestamp: DateTime<Utc>,
}

/// How an investigation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Terminal {
    /// The only successful ending.
    FinalAnswer(FinalAnswer),
    /// The iteration budget ran out without a final answer.
    MaxIterations { message: String },
    /// A human rejected an action or aborted the run.
    Aborted { reason: String },
    /// An unrecoverable error.
    FatalError { message: String },
}

impl Terminal {
    /// Short machine-readable name of the terminal state.
    pub fn kind(&self) -> &'static str {
        match self {
            Terminal::FinalAnswer(_) => "final_answer",
            Terminal::MaxIterations { .. } => "max_iterations",
            Terminal::Aborted { .. } => "aborted",
            Terminal::FatalError { .. } => "fatal_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Terminal::FinalAnswer(_))
    }
}

/// The structured payload a loop run always returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub session_id: SessionId,
    pub terminal: Terminal,
    /// Iterations actually started.
    pub iterations: u32,
    pub history: Vec<Interaction>,
    pub duration_secs: f64,
}
