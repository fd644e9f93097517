//! The structured decision a model produces each iteration.
//!
//! Exactly one of `Action` or `FinalAnswer` is produced per response. The
//! wire format the model writes is looser than these types; the response
//! interpreter in `sleuth-core` is responsible for normalizing it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request to run one registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Registered tool name. Never empty.
    pub tool: String,
    /// Tool parameters. Defaults to an empty map, never null.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Why the model wants to run this tool.
    #[serde(default)]
    pub reasoning: String,
    /// What the model expects to learn.
    #[serde(default)]
    pub expected_result: String,
}

impl Action {
    /// Build an action with no reasoning attached.
    pub fn new(tool: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            parameters,
            reasoning: String::new(),
            expected_result: String::new(),
        }
    }
}

/// The model's concluding answer to the investigation question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub main_response: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub analyzed_components: Vec<String>,
}

/// Tagged union over the two decision shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Action(Action),
    FinalAnswer(FinalAnswer),
}

impl Decision {
    /// The wire discriminant: `"action"` or `"final_answer"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::Action(_) => "action",
            Decision::FinalAnswer(_) => "final_answer",
        }
    }
}
