//! Diagnostic tools over a shared kubectl backend.
//!
//! Every tool holds a clone of [`KubeBackend`]. Parameters are checked by a
//! `ParameterValidator` built when the tool is instantiated; the
//! `namespace-allowed` check is registered on every validator so no tool can
//! reach outside the configured namespaces.

pub mod health;
pub mod kubectl;
pub mod workload;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use sleuth_contracts::{
    error::ToolError,
    params::{ParameterRule, ParameterRuleKind, ParameterSchema},
    tool::ToolContext,
};
use sleuth_schema::validator::ParameterValidator;

use crate::{config::KubectlConfig, runner::KubectlRunner};

/// DNS-1123 label, as required for namespaces.
pub(crate) const DNS_LABEL: &str = "^[a-z0-9]([-a-z0-9]*[a-z0-9])?$";
/// DNS-1123 subdomain, as required for pod names.
pub(crate) const DNS_SUBDOMAIN: &str = "^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$";

pub(crate) const NAMESPACE_CHECK: &str = "namespace-allowed";

/// The runner and settings every tool shares.
#[derive(Clone)]
pub struct KubeBackend {
    runner: Arc<dyn KubectlRunner>,
    config: Arc<KubectlConfig>,
}

impl KubeBackend {
    pub fn new(runner: Arc<dyn KubectlRunner>, config: KubectlConfig) -> Self {
        Self {
            runner,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &KubectlConfig {
        &self.config
    }

    /// The `namespace` parameter, or the configured default.
    pub(crate) fn namespace<'c>(&'c self, context: &'c ToolContext) -> &'c str {
        context
            .str_param("namespace")
            .unwrap_or(&self.config.namespace)
    }

    pub(crate) fn run(&self, args: &[String], context: &ToolContext) -> Result<String, ToolError> {
        debug!(
            session_id = %context.session_id,
            args = %args.join(" "),
            "dispatching kubectl"
        );
        self.runner.run(args, context.timeout)
    }

    /// Run and parse stdout as JSON. Empty output is `null`.
    pub(crate) fn run_json(&self, args: &[String], context: &ToolContext) -> Result<Value, ToolError> {
        let out = self.run(args, context)?;
        if out.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&out)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to parse kubectl output as JSON: {e}")))
    }

    /// Build a validator for `schema` with the namespace check registered.
    pub(crate) fn validator(&self, schema: ParameterSchema) -> Result<ParameterValidator, ToolError> {
        let mut validator =
            ParameterValidator::new(schema).map_err(|e| ToolError::Unavailable(e.to_string()))?;
        let config = Arc::clone(&self.config);
        validator.register_check(
            NAMESPACE_CHECK,
            Box::new(move |params| {
                let namespace = params
                    .get("namespace")
                    .and_then(Value::as_str)
                    .unwrap_or(&config.namespace);
                (!config.namespace_allowed(namespace)).then(|| {
                    format!(
                        "namespace '{namespace}' is not in allowed namespaces: {:?}",
                        config.allowed_namespaces
                    )
                })
            }),
        );
        Ok(validator)
    }
}

// ── Schema helpers ───────────────────────────────────────────────────────────

pub(crate) fn namespace_property() -> Value {
    json!({
        "type": "string",
        "pattern": DNS_LABEL,
        "maxLength": 63,
        "description": "Namespace to query. Defaults to the configured namespace."
    })
}

pub(crate) fn pod_name_property() -> Value {
    json!({
        "type": "string",
        "pattern": DNS_SUBDOMAIN,
        "maxLength": 253,
        "description": "Name of the pod."
    })
}

pub(crate) fn namespace_rule() -> ParameterRule {
    ParameterRule {
        rule_id: NAMESPACE_CHECK.to_string(),
        description: "Target namespace must be in the allowed list".to_string(),
        kind: ParameterRuleKind::Custom {
            function_name: NAMESPACE_CHECK.to_string(),
        },
    }
}

/// An object schema that rejects unknown keys.
pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub(crate) fn bool_param(context: &ToolContext, key: &str) -> bool {
    context
        .parameters
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub(crate) fn u64_param(context: &ToolContext, key: &str) -> Option<u64> {
    context.parameters.get(key).and_then(Value::as_u64)
}

/// A string parameter that the schema already marks required.
pub(crate) fn required_str<'c>(context: &'c ToolContext, key: &str) -> Result<&'c str, ToolError> {
    context
        .str_param(key)
        .ok_or_else(|| ToolError::InvalidParameters(format!("required parameter '{key}' is missing")))
}

pub(crate) fn strings<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

pub(crate) fn items(list: &Value) -> &[Value] {
    list.get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
