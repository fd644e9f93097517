//! Cluster-wide health tools: node conditions and recent events.

use serde_json::{json, Map, Value};
use tracing::info;

use sleuth_contracts::{
    error::ToolError,
    params::ParameterSchema,
    tool::{ToolContext, ToolResult},
};
use sleuth_core::traits::Tool;
use sleuth_schema::validator::ParameterValidator;

use super::{bool_param, items, object_schema, strings, u64_param, KubeBackend};

pub const CHECK_NODE_STATUS: &str = "check_node_status";
pub const CHECK_CLUSTER_EVENTS: &str = "check_cluster_events";

const DEFAULT_EVENT_LIMIT: u64 = 50;

// ── check_node_status ────────────────────────────────────────────────────────

pub struct CheckNodeStatus {
    backend: KubeBackend,
    validator: ParameterValidator,
}

impl CheckNodeStatus {
    pub fn new(backend: KubeBackend) -> Result<Self, ToolError> {
        let validator = ParameterValidator::new(ParameterSchema {
            schema_id: "check-node-status-params-v1".to_string(),
            json_schema: object_schema(json!({}), &[]),
            rules: Vec::new(),
        })
        .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        Ok(Self { backend, validator })
    }
}

fn summarize_node(node: &Value) -> Value {
    let conditions = node
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let status_of = |kind: &str| {
        conditions
            .iter()
            .find(|c| c.get("type").and_then(Value::as_str) == Some(kind))
            .and_then(|c| c.get("status"))
            .and_then(Value::as_str)
    };

    // Any condition other than Ready that is True is a pressure signal.
    let pressures: Vec<&str> = conditions
        .iter()
        .filter(|c| c.get("status").and_then(Value::as_str) == Some("True"))
        .filter_map(|c| c.get("type").and_then(Value::as_str))
        .filter(|kind| *kind != "Ready")
        .collect();

    json!({
        "name": node.pointer("/metadata/name"),
        "ready": status_of("Ready") == Some("True"),
        "pressures": pressures,
    })
}

impl Tool for CheckNodeStatus {
    fn name(&self) -> &str {
        CHECK_NODE_STATUS
    }

    fn description(&self) -> &str {
        "Checks the status (Ready, NotReady, etc.) and pressure conditions of all nodes in the cluster."
    }

    fn parameters_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["nodes/list".to_string()]
    }

    fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        self.validator.check(parameters)
    }

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
        info!(session_id = %context.session_id, "checking node status");
        let list = self
            .backend
            .run_json(&strings(["get", "nodes", "-o", "json"]), context)?;
        let nodes: Vec<Value> = items(&list).iter().map(summarize_node).collect();
        let not_ready = nodes.iter().filter(|n| n["ready"] == json!(false)).count();
        Ok(ToolResult::success(
            json!({ "total": nodes.len(), "not_ready": not_ready, "nodes": nodes }),
            0.0,
        ))
    }
}

// ── check_cluster_events ─────────────────────────────────────────────────────

pub struct CheckClusterEvents {
    backend: KubeBackend,
    validator: ParameterValidator,
}

impl CheckClusterEvents {
    pub fn new(backend: KubeBackend) -> Result<Self, ToolError> {
        let validator = ParameterValidator::new(ParameterSchema {
            schema_id: "check-cluster-events-params-v1".to_string(),
            json_schema: object_schema(
                json!({
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 500,
                        "description": "Most recent events to return. Defaults to 50."
                    },
                    "warnings_only": {
                        "type": "boolean",
                        "description": "Only return events of type Warning."
                    }
                }),
                &[],
            ),
            rules: Vec::new(),
        })
        .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        Ok(Self { backend, validator })
    }

    /// Events are listed cluster-wide when every namespace is allowed, and
    /// from the configured namespace otherwise.
    fn scope(&self) -> Vec<String> {
        let config = self.backend.config();
        if config.all_namespaces_allowed() {
            strings(["--all-namespaces"])
        } else {
            strings(["-n", config.namespace.as_str()])
        }
    }
}

fn summarize_event(event: &Value) -> Value {
    json!({
        "namespace": event.pointer("/metadata/namespace"),
        "type": event.get("type"),
        "reason": event.get("reason"),
        "object": format!(
            "{}/{}",
            event.pointer("/involvedObject/kind").and_then(Value::as_str).unwrap_or("?"),
            event.pointer("/involvedObject/name").and_then(Value::as_str).unwrap_or("?")
        ),
        "message": event.get("message"),
        "count": event.get("count"),
        "last_seen": event.get("lastTimestamp"),
    })
}

impl Tool for CheckClusterEvents {
    fn name(&self) -> &str {
        CHECK_CLUSTER_EVENTS
    }

    fn description(&self) -> &str {
        "Retrieves recent cluster events, which often explain scheduling failures, \
         crash loops and node problems."
    }

    fn parameters_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["events/list".to_string()]
    }

    fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        self.validator.check(parameters)
    }

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let limit = u64_param(context, "limit").unwrap_or(DEFAULT_EVENT_LIMIT);
        let warnings_only = bool_param(context, "warnings_only");

        let mut args = strings(["get", "events"]);
        args.extend(self.scope());
        args.extend(strings(["-o", "json"]));

        info!(session_id = %context.session_id, limit, warnings_only, "checking cluster events");
        let list = self.backend.run_json(&args, context)?;

        let matching: Vec<&Value> = items(&list)
            .iter()
            .filter(|e| !warnings_only || e.get("type").and_then(Value::as_str) == Some("Warning"))
            .collect();
        let skip = matching.len().saturating_sub(usize::try_from(limit).unwrap_or(usize::MAX));
        let events: Vec<Value> = matching[skip..].iter().map(|e| summarize_event(e)).collect();

        Ok(ToolResult::success(
            json!({ "total": matching.len(), "returned": events.len(), "events": events }),
            0.0,
        ))
    }
}
