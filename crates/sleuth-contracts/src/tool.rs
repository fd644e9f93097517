//! Tool invocation results and the context handed to each call.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::SessionId;

/// Immutable outcome of one tool invocation.
///
/// `error` is present iff `success` is false, and `data` iff it is true.
/// Fields are private so that invariant holds for every value in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    success: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Seconds spent in the call.
    execution_time: f64,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// A present `data` field is kept even when it is JSON null, so a successful
/// result with null data survives a round trip unchanged.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ToolResult {
    pub fn success(data: Value, execution_time: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Attach one metadata entry, replacing any previous value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replace the recorded duration with one measured by the caller.
    pub fn with_execution_time(mut self, execution_time: f64) -> Self {
        self.execution_time = execution_time;
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn execution_time(&self) -> f64 {
        self.execution_time
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Everything a tool sees for a single call.
///
/// A tool never observes the investigation state; it only gets the validated
/// parameters and this ambient context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub parameters: Map<String, Value>,
    /// When set, tools that mutate the cluster must only simulate.
    pub dry_run: bool,
    pub timeout: Option<Duration>,
    pub metadata: Map<String, Value>,
}

impl ToolContext {
    pub fn new(session_id: SessionId, parameters: Map<String, Value>) -> Self {
        Self {
            session_id,
            parameters,
            dry_run: false,
            timeout: None,
            metadata: Map::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// String parameter lookup; `None` if absent or not a string.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// What the model is told about one registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub description: String,
    /// JSON Schema for the parameter map. `{}` when the tool declares none.
    pub parameters: Value,
    #[serde(default)]
    pub dangerous: bool,
}
