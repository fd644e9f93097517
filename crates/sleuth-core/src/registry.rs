//! The tool registry: name resolution, descriptions and the only execution
//! gateway for tools.
//!
//! Tools are registered as factories and instantiated lazily on first use.
//! The registry is the boundary past which tool failures become data: any
//! `ToolError`, initialization failure or panic raised by a tool is turned
//! into a failed `ToolResult` here and never propagates to the caller.
//!
//! Registration happens at startup through `&mut self`; afterwards the
//! registry is shared read-only (typically behind an `Arc`) and `execute` is
//! safe to call from several loops at once.

use std::{
    any::Any,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, OnceLock},
    time::Instant,
};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use sleuth_contracts::{
    error::{SleuthError, SleuthResult, ToolError},
    tool::{ToolContext, ToolDescription, ToolResult},
};

use crate::traits::Tool;

/// Builds a tool instance. Called until one instantiation succeeds.
type ToolFactory = Box<dyn Fn() -> Result<Arc<dyn Tool>, ToolError> + Send + Sync>;

struct Entry {
    factory: ToolFactory,
    instance: OnceLock<Arc<dyn Tool>>,
}

impl Entry {
    fn instance(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        if let Some(tool) = self.instance.get() {
            return Ok(Arc::clone(tool));
        }

        let built = panic::catch_unwind(AssertUnwindSafe(|| (self.factory)()))
            .map_err(|payload| {
                ToolError::Unavailable(format!("factory panicked: {}", panic_message(&*payload)))
            })??;

        if built.name() != name {
            return Err(ToolError::Unavailable(format!(
                "factory registered as '{}' built a tool named '{}'",
                name,
                built.name()
            )));
        }

        // A concurrent caller may have won the race; both instances are
        // equivalent and the first one stored is kept.
        Ok(Arc::clone(self.instance.get_or_init(|| built)))
    }
}

/// Registry mapping tool names to lazily-built tool instances.
#[derive(Default)]
pub struct ToolRegistry {
    entries: BTreeMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if the name is taken; `InvalidTool` if the name is
    /// empty or contains whitespace.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> SleuthResult<()>
    where
        F: Fn() -> Result<Arc<dyn Tool>, ToolError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(SleuthError::InvalidTool {
                reason: "tool names must be non-empty and contain no whitespace".to_string(),
                name,
            });
        }
        if self.entries.contains_key(&name) {
            return Err(SleuthError::AlreadyRegistered { name });
        }

        debug!(tool = %name, "tool registered");
        self.entries.insert(
            name,
            Entry {
                factory: Box::new(factory),
                instance: OnceLock::new(),
            },
        );
        Ok(())
    }

    /// Register an already-built tool under its own name.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> SleuthResult<()> {
        let name = tool.name().to_string();
        let for_factory = Arc::clone(&tool);
        self.register(name.clone(), move || Ok(Arc::clone(&for_factory)))?;
        if let Some(entry) = self.entries.get(&name) {
            let _ = entry.instance.set(tool);
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptions of every registered tool, for prompt construction.
    ///
    /// Never fails. A tool that cannot be instantiated is still listed, with
    /// a placeholder description.
    pub fn describe(&self) -> BTreeMap<String, ToolDescription> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let description = match entry.instance(name) {
                    Ok(tool) => ToolDescription {
                        description: tool.description().to_string(),
                        parameters: tool.parameters_schema(),
                        dangerous: tool.is_dangerous(),
                    },
                    Err(e) => {
                        warn!(tool = %name, error = %e, "tool description unavailable");
                        ToolDescription {
                            description: format!("Error retrieving description: {e}"),
                            parameters: Value::Object(Map::new()),
                            dangerous: false,
                        }
                    }
                };
                (name.clone(), description)
            })
            .collect()
    }

    /// Names of registered tools that declare themselves dangerous.
    pub fn dangerous_tools(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(name, entry)| {
                entry
                    .instance(name)
                    .map(|tool| tool.is_dangerous())
                    .unwrap_or(false)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Validate and run the named tool.
    ///
    /// # Errors
    ///
    /// Only `ToolNotFound`. Every failure of the tool itself comes back as
    /// `Ok` with a failed `ToolResult`.
    pub fn execute(&self, name: &str, context: &ToolContext) -> SleuthResult<ToolResult> {
        let entry = self.entries.get(name).ok_or_else(|| SleuthError::ToolNotFound {
            name: name.to_string(),
        })?;

        let started = Instant::now();
        let outcome = entry.instance(name).and_then(|tool| {
            debug!(
                tool = %name,
                session_id = %context.session_id,
                dry_run = context.dry_run,
                "executing tool"
            );
            panic::catch_unwind(AssertUnwindSafe(|| {
                tool.validate(&context.parameters)?;
                tool.execute(context)
            }))
            .unwrap_or_else(|payload| {
                Err(ToolError::ExecutionFailed(format!(
                    "tool panicked: {}",
                    panic_message(&*payload)
                )))
            })
        });
        let elapsed = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %name, error = %e, "tool execution failed");
                ToolResult::failure(e.to_string(), elapsed)
            }
        };

        Ok(result
            .with_execution_time(elapsed)
            .with_metadata("tool", Value::String(name.to_string()))
            .with_metadata("dry_run", Value::Bool(context.dry_run)))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use serde_json::json;
    use sleuth_contracts::state::SessionId;

    use super::*;

    // ── Mock tools ───────────────────────────────────────────────────────────

    /// Echoes its parameters back and counts executions.
    struct EchoTool {
        executions: Arc<Mutex<u32>>,
    }

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the parameters back"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
            if parameters.get("text").is_some_and(|v| !v.is_string()) {
                return Err(ToolError::InvalidParameters("'text' must be a string".into()));
            }
            Ok(())
        }

        fn execute(&self, context: &ToolContext) -> Result<ToolResult, ToolError> {
            *self.executions.lock().unwrap() += 1;
            Ok(ToolResult::success(Value::Object(context.parameters.clone()), 0.0))
        }
    }

    struct PanickingTool;

    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn is_dangerous(&self) -> bool {
            true
        }

        fn validate(&self, _parameters: &Map<String, Value>) -> Result<(), ToolError> {
            Ok(())
        }

        fn execute(&self, _context: &ToolContext) -> Result<ToolResult, ToolError> {
            panic!("kaboom")
        }
    }

    fn echo() -> (Arc<dyn Tool>, Arc<Mutex<u32>>) {
        let executions = Arc::new(Mutex::new(0));
        let tool = Arc::new(EchoTool {
            executions: executions.clone(),
        });
        (tool, executions)
    }

    fn context(parameters: Value) -> ToolContext {
        ToolContext::new(
            SessionId::new(),
            parameters.as_object().cloned().unwrap_or_default(),
        )
    }

    // ── Registration ─────────────────────────────────────────────────────────

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(echo().0).unwrap();
        match registry.register_tool(echo().0) {
            Err(SleuthError::AlreadyRegistered { name }) => assert_eq!(name, "echo"),
            other => panic!("expected AlreadyRegistered, got {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_with_whitespace_are_invalid() {
        let mut registry = ToolRegistry::new();
        let result = registry.register("get pods", || Err(ToolError::Unavailable("x".into())));
        assert!(matches!(result, Err(SleuthError::InvalidTool { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn factory_is_invoked_lazily_and_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = ToolRegistry::new();
        registry
            .register("echo", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(echo().0)
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        registry.execute("echo", &context(json!({}))).unwrap();
        registry.execute("echo", &context(json!({}))).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // ── describe() ───────────────────────────────────────────────────────────

    #[test]
    fn describe_is_idempotent() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(echo().0).unwrap();
        registry.register_tool(Arc::new(PanickingTool)).unwrap();
        assert_eq!(registry.describe(), registry.describe());
    }

    #[test]
    fn describe_reports_failed_factory_with_placeholder() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(echo().0).unwrap();
        registry
            .register("broken", || {
                Err(ToolError::Unavailable("kubectl binary not found".into()))
            })
            .unwrap();

        let descriptions = registry.describe();
        assert_eq!(descriptions.len(), 2);
        let broken = &descriptions["broken"];
        assert!(broken.description.starts_with("Error retrieving description:"));
        assert!(broken.description.contains("kubectl binary not found"));
        assert_eq!(descriptions["echo"].description, "Echo the parameters back");
    }

    #[test]
    fn factory_building_a_differently_named_tool_is_reported() {
        let mut registry = ToolRegistry::new();
        registry.register("alias", || Ok(echo().0)).unwrap();
        let descriptions = registry.describe();
        assert!(descriptions["alias"].description.contains("built a tool named 'echo'"));
    }

    #[test]
    fn dangerous_tools_lists_only_dangerous() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(echo().0).unwrap();
        registry.register_tool(Arc::new(PanickingTool)).unwrap();
        assert_eq!(registry.dangerous_tools(), vec!["explode".to_string()]);
    }

    // ── execute() ────────────────────────────────────────────────────────────

    #[test]
    fn execute_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        match registry.execute("list_pods", &context(json!({"namespace": "default"}))) {
            Err(SleuthError::ToolNotFound { name }) => assert_eq!(name, "list_pods"),
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }

    #[test]
    fn execute_success_adds_metadata() {
        let (tool, executions) = echo();
        let mut registry = ToolRegistry::new();
        registry.register_tool(tool).unwrap();

        let result = registry
            .execute("echo", &context(json!({"text": "hi"})).with_dry_run(true))
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.data(), Some(&json!({"text": "hi"})));
        assert_eq!(result.metadata()["tool"], json!("echo"));
        assert_eq!(result.metadata()["dry_run"], json!(true));
        assert_eq!(*executions.lock().unwrap(), 1);
    }

    #[test]
    fn validation_failure_becomes_failed_result_without_execution() {
        let (tool, executions) = echo();
        let mut registry = ToolRegistry::new();
        registry.register_tool(tool).unwrap();

        let result = registry.execute("echo", &context(json!({"text": 42}))).unwrap();
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("'text' must be a string"));
        assert_eq!(*executions.lock().unwrap(), 0);
    }

    #[test]
    fn panicking_tool_becomes_failed_result() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(PanickingTool)).unwrap();

        let result = registry.execute("explode", &context(json!({}))).unwrap();
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("kaboom"));
    }

    #[test]
    fn failed_factory_becomes_failed_result() {
        let mut registry = ToolRegistry::new();
        registry
            .register("broken", || Err(ToolError::Unavailable("no kubeconfig".into())))
            .unwrap();

        let result = registry.execute("broken", &context(json!({}))).unwrap();
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("no kubeconfig"));
    }
}
