//! Schema-based parameter validator for kubesleuth tools.
//!
//! The JSON Schema document is compiled once when the validator is built, so
//! a bad schema is a startup `ConfigError` rather than a per-call failure.
//! Semantic rules then run in order and every failure is collected, so the
//! model sees the full list of problems in one round-trip.

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use sleuth_contracts::{
    error::{SleuthError, SleuthResult, ToolError},
    params::{ParameterRuleKind, ParameterSchema, ValidationFailure, ValidationReport},
};

/// A caller-supplied check over the whole parameter map.
///
/// Returns `Some(message)` when the check fails, `None` on success.
pub type CustomCheckFn = Box<dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync>;

/// Validates tool parameter maps against one `ParameterSchema`.
pub struct ParameterValidator {
    schema: ParameterSchema,
    compiled: Option<Validator>,
    custom_checks: HashMap<String, CustomCheckFn>,
}

impl ParameterValidator {
    /// Compile `schema`. A null `json_schema` means no structural constraint.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the JSON Schema document does not compile.
    pub fn new(schema: ParameterSchema) -> SleuthResult<Self> {
        let compiled = if schema.json_schema.is_null() {
            None
        } else {
            let validator = jsonschema::validator_for(&schema.json_schema).map_err(|e| {
                SleuthError::ConfigError {
                    reason: format!("invalid JSON Schema '{}': {e}", schema.schema_id),
                }
            })?;
            Some(validator)
        };

        Ok(Self {
            schema,
            compiled,
            custom_checks: HashMap::new(),
        })
    }

    /// Register a custom check under `name`, replacing any previous one.
    ///
    /// The name must match `function_name` in a `Custom` rule.
    pub fn register_check(&mut self, name: impl Into<String>, check: CustomCheckFn) {
        self.custom_checks.insert(name.into(), check);
    }

    pub fn schema_id(&self) -> &str {
        &self.schema.schema_id
    }

    /// The JSON Schema document, as shown to the model. `{}` when absent.
    pub fn json_schema(&self) -> Value {
        if self.schema.json_schema.is_null() {
            Value::Object(Map::new())
        } else {
            self.schema.json_schema.clone()
        }
    }

    /// Run every structural and semantic check.
    pub fn validate(&self, parameters: &Map<String, Value>) -> ValidationReport {
        let mut failures = Vec::new();

        // ── Phase 1: JSON Schema structural validation ───────────────────────
        if let Some(validator) = &self.compiled {
            let instance = Value::Object(parameters.clone());
            for error in validator.iter_errors(&instance) {
                let message = format!("parameter schema violation at {}: {}", error.instance_path, error);
                warn!(schema_id = %self.schema.schema_id, %message, "structural validation failure");
                failures.push(ValidationFailure {
                    rule_id: "json-schema".to_string(),
                    message,
                });
            }
        }

        // ── Phase 2: Semantic rules ──────────────────────────────────────────
        for rule in &self.schema.rules {
            debug!(rule_id = %rule.rule_id, description = %rule.description, "evaluating parameter rule");

            let failure = match &rule.kind {
                ParameterRuleKind::RequiredField { field_path } => resolve_path(parameters, field_path)
                    .is_none()
                    .then(|| format!("required parameter '{field_path}' is missing or null")),

                // Absent optional fields pass; only present values are checked.
                ParameterRuleKind::AllowedValues { field_path, allowed } => {
                    resolve_path(parameters, field_path)
                        .filter(|actual| !allowed.contains(actual))
                        .map(|actual| {
                            format!("parameter '{field_path}' has value {actual} which is not allowed")
                        })
                }

                ParameterRuleKind::ForbiddenTokens { field_path, tokens } => {
                    resolve_path(parameters, field_path)
                        .and_then(Value::as_str)
                        .and_then(|text| {
                            text.split_whitespace().find(|word| {
                                tokens.iter().any(|t| t.eq_ignore_ascii_case(word))
                            })
                        })
                        .map(|word| format!("parameter '{field_path}' uses forbidden token '{word}'"))
                }

                // An unregistered name is itself a failure.
                ParameterRuleKind::Custom { function_name } => {
                    match self.custom_checks.get(function_name.as_str()) {
                        Some(check) => check(parameters),
                        None => Some(format!(
                            "no custom check registered for function name '{function_name}'"
                        )),
                    }
                }
            };

            if let Some(message) = failure {
                warn!(rule_id = %rule.rule_id, %message, "parameter rule failed");
                failures.push(ValidationFailure {
                    rule_id: rule.rule_id.clone(),
                    message,
                });
            }
        }

        let passed = failures.is_empty();
        debug!(
            schema_id = %self.schema.schema_id,
            passed,
            failure_count = failures.len(),
            "parameter validation complete"
        );
        ValidationReport { passed, failures }
    }

    /// `validate`, folded into the error a `Tool::validate` returns.
    pub fn check(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        let report = self.validate(parameters);
        if report.passed {
            Ok(())
        } else {
            Err(ToolError::InvalidParameters(report.summary()))
        }
    }
}

/// Resolve a dot-notation path (e.g. `"selector.app"`). `None` when any
/// segment is missing or the value is null.
fn resolve_path<'v>(parameters: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut current = parameters.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sleuth_contracts::params::ParameterRule;

    use super::*;

    // ── Builder helpers ──────────────────────────────────────────────────────

    fn schema(json_schema: Value, rules: Vec<ParameterRule>) -> ParameterSchema {
        ParameterSchema {
            schema_id: "test-params-v1".to_string(),
            json_schema,
            rules,
        }
    }

    fn rule(id: &str, kind: ParameterRuleKind) -> ParameterRule {
        ParameterRule {
            rule_id: id.to_string(),
            description: format!("{id} rule"),
            kind,
        }
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn pod_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "pod_name": {"type": "string"},
                "tail_lines": {"type": "integer", "minimum": 1}
            },
            "required": ["pod_name"]
        })
    }

    // ── JSON Schema ──────────────────────────────────────────────────────────

    #[test]
    fn schema_pass() {
        let validator = ParameterValidator::new(schema(pod_schema(), vec![])).unwrap();
        let report = validator.validate(&params(json!({"pod_name": "web-1", "tail_lines": 20})));
        assert!(report.passed, "failures: {:?}", report.failures);
    }

    #[test]
    fn schema_fail_reports_each_violation() {
        let validator = ParameterValidator::new(schema(pod_schema(), vec![])).unwrap();
        let report = validator.validate(&params(json!({"tail_lines": 0})));
        assert!(!report.passed);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.rule_id == "json-schema"));
    }

    #[test]
    fn invalid_schema_is_a_config_error() {
        let result = ParameterValidator::new(schema(json!({"type": 12}), vec![]));
        assert!(matches!(result, Err(SleuthError::ConfigError { .. })));
    }

    #[test]
    fn null_schema_is_shown_as_empty_object() {
        let validator = ParameterValidator::new(schema(Value::Null, vec![])).unwrap();
        assert_eq!(validator.json_schema(), json!({}));
        assert!(validator.validate(&Map::new()).passed);
    }

    // ── Semantic rules ───────────────────────────────────────────────────────

    #[test]
    fn required_nested_field() {
        let validator = ParameterValidator::new(schema(
            Value::Null,
            vec![rule(
                "req-selector-app",
                ParameterRuleKind::RequiredField {
                    field_path: "selector.app".to_string(),
                },
            )],
        ))
        .unwrap();

        assert!(validator.validate(&params(json!({"selector": {"app": "web"}}))).passed);
        let report = validator.validate(&params(json!({"selector": {"app": null}})));
        assert!(!report.passed);
        assert!(report.failures[0].message.contains("selector.app"));
    }

    #[test]
    fn allowed_values_only_checks_present_fields() {
        let validator = ParameterValidator::new(schema(
            Value::Null,
            vec![rule(
                "allowed-namespace",
                ParameterRuleKind::AllowedValues {
                    field_path: "namespace".to_string(),
                    allowed: vec![json!("default"), json!("payments")],
                },
            )],
        ))
        .unwrap();

        assert!(validator.validate(&Map::new()).passed);
        assert!(validator.validate(&params(json!({"namespace": "payments"}))).passed);
        let report = validator.validate(&params(json!({"namespace": "kube-system"})));
        assert_eq!(report.failures[0].rule_id, "allowed-namespace");
    }

    #[test]
    fn forbidden_tokens_match_whole_words_case_insensitively() {
        let validator = ParameterValidator::new(schema(
            Value::Null,
            vec![rule(
                "read-only",
                ParameterRuleKind::ForbiddenTokens {
                    field_path: "command".to_string(),
                    tokens: vec!["delete".to_string(), "exec".to_string()],
                },
            )],
        ))
        .unwrap();

        assert!(validator.validate(&params(json!({"command": "get pods -l app=deleter"}))).passed);
        let report = validator.validate(&params(json!({"command": "DELETE pod web-1"})));
        assert!(!report.passed);
        assert!(report.failures[0].message.contains("DELETE"));
    }

    #[test]
    fn custom_check_failure_carries_message() {
        let mut validator = ParameterValidator::new(schema(
            Value::Null,
            vec![rule(
                "no-kube-system",
                ParameterRuleKind::Custom {
                    function_name: "namespace-guard".to_string(),
                },
            )],
        ))
        .unwrap();
        validator.register_check(
            "namespace-guard",
            Box::new(|p| {
                (p.get("namespace") == Some(&json!("kube-system")))
                    .then(|| "kube-system is off limits".to_string())
            }),
        );

        assert!(validator.validate(&params(json!({"namespace": "default"}))).passed);
        let err = validator.check(&params(json!({"namespace": "kube-system"}))).unwrap_err();
        assert_eq!(
            err,
            ToolError::InvalidParameters("[no-kube-system] kube-system is off limits".to_string())
        );
    }

    #[test]
    fn unregistered_custom_check_fails() {
        let validator = ParameterValidator::new(schema(
            Value::Null,
            vec![rule(
                "phantom",
                ParameterRuleKind::Custom {
                    function_name: "does-not-exist".to_string(),
                },
            )],
        ))
        .unwrap();
        let report = validator.validate(&Map::new());
        assert!(report.failures[0].message.contains("does-not-exist"));
    }
}
