//! The generic read-only `kubectl` tool.

use serde_json::{json, Value};
use tracing::info;

use sleuth_contracts::{
    error::ToolError,
    params::{ParameterRule, ParameterRuleKind, ParameterSchema},
    tool::{ToolContext, ToolResult},
};
use sleuth_core::traits::Tool;
use sleuth_schema::validator::ParameterValidator;

use super::{namespace_property, namespace_rule, object_schema, required_str, KubeBackend};
use crate::command::{check_read_only, has_output_flag, namespace_flag, split_command};

pub const NAME: &str = "kubectl";

const READ_ONLY_CHECK: &str = "read-only-command";
const OUTPUT_FORMATS: &[&str] = &["json", "yaml", "wide", "name"];

pub struct KubectlTool {
    backend: KubeBackend,
    validator: ParameterValidator,
}

impl KubectlTool {
    pub fn new(backend: KubeBackend) -> Result<Self, ToolError> {
        let schema = ParameterSchema {
            schema_id: "kubectl-params-v1".to_string(),
            json_schema: object_schema(
                json!({
                    "command": {
                        "type": "string",
                        "minLength": 1,
                        "description": "kubectl arguments without the binary name, e.g. \"get pods -l app=web\"."
                    },
                    "namespace": namespace_property(),
                    "output": {
                        "type": "string",
                        "enum": OUTPUT_FORMATS,
                        "description": "Output format. `get` defaults to json."
                    }
                }),
                &["command"],
            ),
            rules: vec![
                namespace_rule(),
                ParameterRule {
                    rule_id: READ_ONLY_CHECK.to_string(),
                    description: "Command must be read-only and stay inside policy".to_string(),
                    kind: ParameterRuleKind::Custom {
                        function_name: READ_ONLY_CHECK.to_string(),
                    },
                },
            ],
        };

        let mut validator = backend.validator(schema)?;
        let config = backend.config().clone();
        validator.register_check(
            READ_ONLY_CHECK,
            Box::new(move |params| {
                let command = params.get("command").and_then(Value::as_str)?;
                let args = match split_command(command) {
                    Ok(args) => strip_binary(args),
                    Err(e) => return Some(format!("invalid command format: {e}")),
                };
                check_read_only(&args, &config).err()
            }),
        );

        Ok(Self { backend, validator })
    }

    /// Final argument list: the command, plus `-n` unless the command names
    /// its own scope, plus an output flag.
    fn build_args(&self, context: &ToolContext) -> Result<(Vec<String>, bool), ToolError> {
        let command = required_str(context, "command")?;
        let mut args = strip_binary(split_command(command).map_err(ToolError::InvalidParameters)?);

        let scoped = namespace_flag(&args)
            .map_err(ToolError::InvalidParameters)?
            .is_some()
            || args.iter().any(|a| a == "-A" || a == "--all-namespaces");
        if !scoped {
            args.push("-n".to_string());
            args.push(self.backend.namespace(context).to_string());
        }

        let output = match context.str_param("output") {
            Some(format) => Some(format),
            None if args.first().map(String::as_str) == Some("get") => Some("json"),
            None => None,
        };
        let json_output = match output {
            Some(format) if !has_output_flag(&args) => {
                args.push("-o".to_string());
                args.push(format.to_string());
                format == "json"
            }
            _ => false,
        };
        Ok((args, json_output))
    }
}

/// Models often include the binary name; drop it.
fn strip_binary(mut args: Vec<String>) -> Vec<String> {
    if args.first().map(String::as_str) == Some("kubectl") {
        args.remove(0);
    }
    args
}

impl Tool for KubectlTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Run a read-only kubectl command (get, describe, logs, top, ...) against the cluster. \
         Other verbs and restricted resources are refused."
    }

    fn parameters_schema(&self) -> Value {
        self.validator.json_schema()
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["get".to_string(), "list".to_string(), "watch".to_string()]
    }

    fn validate(&self, parameters: &serde_json::Map<String, Value>) -> Result<(), ToolError> {
        self.validator.check(parameters)
    }

    fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let (args, json_output) = self.build_args(context)?;
        let command_line = args.join(" ");
        info!(session_id = %context.session_id, command = %command_line, "running kubectl tool");

        let data = if json_output {
            self.backend.run_json(&args, context)?
        } else {
            Value::String(self.backend.run(&args, context)?)
        };
        Ok(ToolResult::success(data, 0.0).with_metadata("command", Value::String(command_line)))
    }
}
