//! Session identity and the per-run investigation state.
//!
//! `AgentState` is owned by exactly one loop run. Its history is replayed
//! into every prompt, so entries are append-only and never mutated.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{decision::Action, tool::ToolResult};

/// Unique identifier for a single investigation.
///
/// Appears in every execution log record and every tracing span field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Create a new, unique session ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Model,
    Tool,
    /// Reserved for callers that keep feedback in history. `AgentLoop` carries
    /// feedback only into the next prompt and never appends it.
    Feedback,
}

/// Body of a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractionContent {
    Text(String),
    ToolResult(ToolResult),
}

/// One entry in the investigation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub role: Role,
    pub content: InteractionContent,
    pub timestamp: DateTime<Utc>,
    /// Set on `Role::Tool` entries: the action whose result this is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

impl Interaction {
    /// Reasoning text (or raw output) produced by the model.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: InteractionContent::Text(text.into()),
            timestamp: Utc::now(),
            action: None,
        }
    }

    /// A `Role::Feedback` entry. Not produced by `AgentLoop`.
    pub fn feedback(text: impl Into<String>) -> Self {
        Self {
            role: Role::Feedback,
            content: InteractionContent::Text(text.into()),
            timestamp: Utc::now(),
            action: None,
        }
    }

    /// A tool result paired with the action that produced it.
    pub fn tool(action: Action, result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: InteractionContent::ToolResult(result),
            timestamp: Utc::now(),
            action: Some(action),
        }
    }

    /// The text body, if this entry is not a tool result.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            InteractionContent::Text(text) => Some(text),
            InteractionContent::ToolResult(_) => None,
        }
    }

    /// The tool result body, if this is a `Role::Tool` entry.
    pub fn tool_result(&self) -> Option<&ToolResult> {
        match &self.content {
            InteractionContent::ToolResult(result) => Some(result),
            InteractionContent::Text(_) => None,
        }
    }
}

/// The mutable record of one investigation run.
///
/// `iteration` only increases and `history` only grows; neither can be
/// rewound through this API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub session_id: SessionId,
    pub max_iterations: u32,
    pub started_at: DateTime<Utc>,
    iteration: u32,
    history: Vec<Interaction>,
}

impl AgentState {
    pub fn new(session_id: SessionId, max_iterations: u32) -> Self {
        Self {
            session_id,
            max_iterations,
            started_at: Utc::now(),
            iteration: 0,
            history: Vec::new(),
        }
    }

    /// Number of model round-trips started so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn history(&self) -> &[Interaction] {
        &self.history
    }

    /// Count the start of a new model round-trip.
    pub fn advance(&mut self) {
        self.iteration = self.iteration.saturating_add(1);
    }

    pub fn push(&mut self, interaction: Interaction) {
        self.history.push(interaction);
    }

    pub fn has_reached_max_iterations(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// Wall-clock seconds since the session started.
    pub fn elapsed_secs(&self) -> f64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Consume the state, yielding its history for the final report.
    pub fn into_history(self) -> Vec<Interaction> {
        self.history
    }
}
