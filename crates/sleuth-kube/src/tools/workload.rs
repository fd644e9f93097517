//! Pod-level tools: status, logs, describe and the one mutating tool,
//! `delete_pod`.

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use sleuth_contracts::{
    error::ToolError,
    params::ParameterSchema,
    tool::{ToolContext, ToolResult},
};
use sleuth_core::traits::Tool;
use sleuth_schema::validator::ParameterValidator;

use super::{
    bool_param, items, namespace_property, namespace_rule, object_schema, pod_name_property,
    required_str, strings, u64_param, KubeBackend,
};

pub const CHECK_POD_STATUS: &str = "check_pod_status";
pub const GET_LOGS: &str = "get_logs";
pub const DESCRIBE_POD: &str = "describe_pod";
pub const DELETE_POD: &str = "delete_pod";

const DEFAULT_TAIL_LINES: u64 = 100;

fn schema(id: &str, properties: Value, required: &[&str]) -> ParameterSchema {
    ParameterSchema {
        schema_id: id.to_string(),
        json_schema: object_schema(properties, required),
        rules: vec![namespace_rule()],
    }
}

// ── check_pod_status ─────────────────────────────────────────────────────────

pub struct CheckPodStatus {
    backend: KubeBackend,
    validator: ParameterValidator,
}

impl CheckPodStatus {
    pub fn new(backend: KubeBackend) -> Result<Self, ToolError> {
        let validator = backend.validator(schema(
            "check-pod-status-params-v1",
            json!({ "namespace": namespace_property() }),
            &[],
        ))?;
        Ok(Self { backend, validator })
    }
}

/// One pod reduced to what an investigator looks at first.
fn summarize_pod(pod: &Value) -> Value {
    let statuses = pod
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let ready = !statuses.is_empty()
        && statuses
            .iter()
            .all(|s| s.get("ready").and_then(Value::as_bool).unwrap_or(false));
    let restarts: u64 = statuses
        .iter()
        .filter_map(|s| s.get("restartCount").and_then(Value::as_u64))
        .sum();

    let waiting = statuses.iter().find_map(|s| {
        s.pointer("/state/waiting/reason")
            .or_else(|| s.pointer("/state/terminated/reason"))
            .and_then(Value::as_str)
    });
    let unmet_condition = pod
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.get("status").and_then(Value::as_str) == Some("False"))
                .and_then(|c| c.get("reason"))
                .and_then(Value::as_str)
        });

    json!({
        "name": pod.pointer("/metadata/name"),
        "phase": pod.pointer("/status/phase"),
        "ready": ready,
        "restarts": restarts,
        "reason": waiting.or(unmet_condition),
        "node": pod.pointer("/spec/nodeName"),
    })
}

impl Tool for CheckPodStatus {
    fn name(&self) -> &str {
        CHECK_POD_STATUS
    }

    fn description(&self) -> &str {
        "Checks the status (Running, Pending, Failed, etc.) of pods within a namespace, \
         with readiness, restart counts and the reason a pod is not running. \
         Defaults to the configured namespace."
    }

    fn parameters_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["pods/list".to_string()]
    }

    fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        self.validator.check(parameters)
    }

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let namespace = self.backend.namespace(context);
        info!(session_id = %context.session_id, %namespace, "checking pod status");

        let list = self
            .backend
            .run_json(&strings(["get", "pods", "-n", namespace, "-o", "json"]), context)?;
        let pods: Vec<Value> = items(&list).iter().map(summarize_pod).collect();
        let not_ready = pods.iter().filter(|p| p["ready"] == json!(false)).count();

        Ok(ToolResult::success(
            json!({
                "namespace": namespace,
                "total": pods.len(),
                "not_ready": not_ready,
                "pods": pods,
            }),
            0.0,
        ))
    }
}

// ── get_logs ─────────────────────────────────────────────────────────────────

pub struct GetLogs {
    backend: KubeBackend,
    validator: ParameterValidator,
}

impl GetLogs {
    pub fn new(backend: KubeBackend) -> Result<Self, ToolError> {
        let validator = backend.validator(schema(
            "get-logs-params-v1",
            json!({
                "pod_name": pod_name_property(),
                "namespace": namespace_property(),
                "container": {
                    "type": "string",
                    "pattern": super::DNS_LABEL,
                    "description": "Container name, for multi-container pods."
                },
                "tail_lines": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10000,
                    "description": "Number of most recent lines. Defaults to 100."
                },
                "previous": {
                    "type": "boolean",
                    "description": "Logs of the previous, terminated container instance."
                }
            }),
            &["pod_name"],
        ))?;
        Ok(Self { backend, validator })
    }
}

impl Tool for GetLogs {
    fn name(&self) -> &str {
        GET_LOGS
    }

    fn description(&self) -> &str {
        "Fetches recent log lines of a pod's container. Use previous=true to read \
         the logs of a crashed container before its restart."
    }

    fn parameters_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["pods/log".to_string()]
    }

    fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        self.validator.check(parameters)
    }

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let pod = required_str(context, "pod_name")?;
        let namespace = self.backend.namespace(context);
        let tail = u64_param(context, "tail_lines").unwrap_or(DEFAULT_TAIL_LINES);
        let previous = bool_param(context, "previous");

        let mut args = strings(["logs", pod, "-n", namespace]);
        args.push(format!("--tail={tail}"));
        if let Some(container) = context.str_param("container") {
            args.push("-c".to_string());
            args.push(container.to_string());
        }
        if previous {
            args.push("--previous".to_string());
        }

        info!(session_id = %context.session_id, %pod, %namespace, tail, previous, "fetching pod logs");
        let logs = self.backend.run(&args, context)?;
        Ok(ToolResult::success(
            json!({
                "pod": pod,
                "namespace": namespace,
                "previous": previous,
                "lines": logs.lines().count(),
                "logs": logs,
            }),
            0.0,
        ))
    }
}

// ── describe_pod ─────────────────────────────────────────────────────────────

pub struct DescribePod {
    backend: KubeBackend,
    validator: ParameterValidator,
}

impl DescribePod {
    pub fn new(backend: KubeBackend) -> Result<Self, ToolError> {
        let validator = backend.validator(schema(
            "describe-pod-params-v1",
            json!({
                "pod_name": pod_name_property(),
                "namespace": namespace_property()
            }),
            &["pod_name"],
        ))?;
        Ok(Self { backend, validator })
    }
}

impl Tool for DescribePod {
    fn name(&self) -> &str {
        DESCRIBE_POD
    }

    fn description(&self) -> &str {
        "Shows the detailed description of a pod: container states, last termination, \
         restart count and the pod's recent events."
    }

    fn parameters_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["pods/get".to_string(), "events/list".to_string()]
    }

    fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        self.validator.check(parameters)
    }

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let pod = required_str(context, "pod_name")?;
        let namespace = self.backend.namespace(context);
        let text = self
            .backend
            .run(&strings(["describe", "pod", pod, "-n", namespace]), context)?;
        Ok(ToolResult::success(
            json!({ "pod": pod, "namespace": namespace, "description": text }),
            0.0,
        ))
    }
}

// ── delete_pod ───────────────────────────────────────────────────────────────

/// Deletes a pod so its controller recreates it. Always reviewed by a human.
pub struct DeletePod {
    backend: KubeBackend,
    validator: ParameterValidator,
}

impl DeletePod {
    pub fn new(backend: KubeBackend) -> Result<Self, ToolError> {
        let validator = backend.validator(schema(
            "delete-pod-params-v1",
            json!({
                "pod_name": pod_name_property(),
                "namespace": namespace_property(),
                "grace_period_seconds": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 3600,
                    "description": "Seconds the pod gets to shut down."
                }
            }),
            &["pod_name"],
        ))?;
        Ok(Self { backend, validator })
    }
}

impl Tool for DeletePod {
    fn name(&self) -> &str {
        DELETE_POD
    }

    fn description(&self) -> &str {
        "Deletes a pod so that its controller recreates it. Mutates the cluster and \
         always requires human approval."
    }

    fn parameters_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["pods/delete".to_string()]
    }

    fn is_dangerous(&self) -> bool {
        true
    }

    fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        self.validator.check(parameters)
    }

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let pod = required_str(context, "pod_name")?;
        let namespace = self.backend.namespace(context);

        let mut args = strings(["delete", "pod", pod, "-n", namespace]);
        if let Some(grace) = u64_param(context, "grace_period_seconds") {
            args.push(format!("--grace-period={grace}"));
        }
        if context.dry_run {
            args.push("--dry-run=client".to_string());
        }

        warn!(
            session_id = %context.session_id,
            %pod,
            %namespace,
            dry_run = context.dry_run,
            "deleting pod"
        );
        let output = self.backend.run(&args, context)?;
        Ok(ToolResult::success(
            json!({
                "pod": pod,
                "namespace": namespace,
                "deleted": !context.dry_run,
                "dry_run": context.dry_run,
                "output": output,
            }),
            0.0,
        ))
    }
}
