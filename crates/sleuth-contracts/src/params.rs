//! Tool parameter schemas and validation reports.
//!
//! A tool may declare a `ParameterSchema` combining a JSON Schema document
//! with semantic rules JSON Schema cannot express. The validator in
//! `sleuth-schema` produces a `ValidationReport` from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything a tool's parameter map is checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Identifier used in logs, e.g. "kubectl-params-v1".
    pub schema_id: String,
    /// Structural JSON Schema. Also shown to the model in tool descriptions.
    pub json_schema: Value,
    /// Extra rules evaluated after structural validation.
    #[serde(default)]
    pub rules: Vec<ParameterRule>,
}

/// A single semantic rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRule {
    pub rule_id: String,
    pub description: String,
    pub kind: ParameterRuleKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParameterRuleKind {
    /// The field at the dotted `field_path` must be present and non-null.
    RequiredField { field_path: String },

    /// The field, if present, must equal one of `allowed`.
    AllowedValues {
        field_path: String,
        allowed: Vec<Value>,
    },

    /// The field, if a string, must not contain any of `tokens` as a
    /// whitespace-separated word.
    ForbiddenTokens {
        field_path: String,
        tokens: Vec<String>,
    },

    /// Delegate to a check registered on the validator by name.
    Custom { function_name: String },
}

/// Result of validating one parameter map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True only if every check passed.
    pub passed: bool,
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    /// All failure messages joined into one line.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}] {}", f.rule_id, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub rule_id: String,
    pub message: String,
}
