//! Prompt rendering for the investigation loop.
//!
//! The system prompt is the fixed instructions plus the tool catalogue. The
//! user prompt carries the question, the caller's context, every executed
//! action paired with its result, and any pending feedback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sleuth_contracts::{
    error::{SleuthError, SleuthResult},
    execution::RenderedPrompt,
    state::{AgentState, Role},
    tool::ToolDescription,
};

pub const TOOL_DESCRIPTIONS_PLACEHOLDER: &str = "{tool_descriptions}";

const BASE_SYSTEM_PROMPT: &str = "You are an AI agent analyzing a Kubernetes cluster.
Your task is to help diagnose and solve problems by following these steps:
1. Understand the user's question
2. Think about what information you need
3. Choose appropriate tools to gather that information
4. Analyze the results
5. Either gather more information or provide a final answer

Always explain your reasoning and be transparent about your confidence level.";

const TOOL_DESCRIPTION_PROMPT: &str = "Available tools for analysis:
{tool_descriptions}

For each tool:
- Consider its purpose and limitations
- Use it appropriately in your analysis
- Handle its results correctly";

const ACTION_FORMAT_PROMPT: &str = r#"When proposing actions, use this JSON format:
{
    "type": "action" | "final_answer",
    "action": {
        "tool": "tool_name",
        "parameters": {},
        "reasoning": "Why this action is needed",
        "expected_result": "What you expect to learn"
    }
}

For final answers:
{
    "type": "final_answer",
    "main_response": "Clear explanation of findings",
    "confidence": 0.0-1.0,
    "reasoning": "How you reached this conclusion",
    "next_steps": ["recommended actions"],
    "analyzed_components": ["what was checked"]
}"#;

/// The three system prompt sections. Overridable from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub base: String,
    /// Must contain `{tool_descriptions}`.
    pub tools: String,
    pub format: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            base: BASE_SYSTEM_PROMPT.to_string(),
            tools: TOOL_DESCRIPTION_PROMPT.to_string(),
            format: ACTION_FORMAT_PROMPT.to_string(),
        }
    }
}

/// Renders system and user prompts from templates and loop state.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    templates: PromptTemplates,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: PromptTemplates) -> Self {
        Self { templates }
    }

    /// System prompt: instructions, tool catalogue, decision format.
    pub fn system_prompt(
        &self,
        tools: &BTreeMap<String, ToolDescription>,
    ) -> SleuthResult<String> {
        if !self.templates.tools.contains(TOOL_DESCRIPTIONS_PLACEHOLDER) {
            return Err(SleuthError::PromptError {
                reason: format!("tools template is missing {TOOL_DESCRIPTIONS_PLACEHOLDER}"),
            });
        }
        let catalogue = self
            .templates
            .tools
            .replace(TOOL_DESCRIPTIONS_PLACEHOLDER, &render_tool_catalogue(tools));
        Ok(format!(
            "{}\n{}\n{}",
            self.templates.base, catalogue, self.templates.format
        ))
    }

    /// User prompt: question, context, action history, feedback.
    ///
    /// `context` is rendered with `question` merged in, so the model sees
    /// both in one object.
    pub fn user_prompt(
        &self,
        question: &str,
        context: &Map<String, Value>,
        state: &AgentState,
        feedback: Option<&str>,
    ) -> SleuthResult<String> {
        let mut prompt_context = context.clone();
        prompt_context.insert("question".to_string(), Value::String(question.to_string()));
        let context_str = pretty(&Value::Object(prompt_context))?;

        let mut history_items = Vec::new();
        let executed = state
            .history()
            .iter()
            .filter(|entry| entry.role == Role::Tool)
            .filter_map(|entry| Some((entry.action.as_ref()?, entry.tool_result()?)));
        for (n, (action, result)) in executed.enumerate() {
            let action_str = pretty(&serde_json::to_value(action).map_err(prompt_error)?)?;
            let result_str = pretty(&serde_json::to_value(result).map_err(prompt_error)?)?;
            history_items.push(format!("Action {}:\n```json\n{action_str}\n```", n + 1));
            history_items.push(format!("Result:\n```json\n{result_str}\n```"));
        }
        let history_str = if history_items.is_empty() {
            "(No actions taken yet)".to_string()
        } else {
            history_items.join("\n\n")
        };

        let mut parts = vec![
            format!("Question: {question}"),
            format!("\nContext:\n{context_str}"),
            format!("\nAction History:\n{history_str}"),
        ];
        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            parts.push(format!("\n\nFeedback on last step: {feedback}"));
        }
        Ok(parts.join("\n\n"))
    }

    pub fn render(
        &self,
        tools: &BTreeMap<String, ToolDescription>,
        question: &str,
        context: &Map<String, Value>,
        state: &AgentState,
        feedback: Option<&str>,
    ) -> SleuthResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: self.system_prompt(tools)?,
            user: self.user_prompt(question, context, state, feedback)?,
        })
    }
}

/// One `- `name`: description` line per tool, followed by a parameter summary
/// drawn from the schema's `properties`.
fn render_tool_catalogue(tools: &BTreeMap<String, ToolDescription>) -> String {
    if tools.is_empty() {
        return "No tool descriptions available.".to_string();
    }

    let mut lines = Vec::new();
    for (name, description) in tools {
        let marker = if description.dangerous {
            " (dangerous, always requires human approval)"
        } else {
            ""
        };
        lines.push(format!("- `{name}`: {}{marker}", description.description));

        let properties = description
            .parameters
            .get("properties")
            .and_then(Value::as_object);
        if let Some(properties) = properties.filter(|p| !p.is_empty()) {
            let summary = properties
                .iter()
                .map(|(param, spec)| {
                    let ty = spec.get("type").and_then(Value::as_str).unwrap_or("any");
                    format!("{param} ({ty})")
                })
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("  Parameters: {summary}"));
        }
    }
    lines.join("\n")
}

fn pretty(value: &Value) -> SleuthResult<String> {
    serde_json::to_string_pretty(value).map_err(prompt_error)
}

fn prompt_error(e: serde_json::Error) -> SleuthError {
    SleuthError::PromptError {
        reason: e.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sleuth_contracts::{
        decision::Action,
        state::{Interaction, SessionId},
        tool::ToolResult,
    };

    use super::*;

    fn catalogue() -> BTreeMap<String, ToolDescription> {
        let mut tools = BTreeMap::new();
        tools.insert(
            "get_logs".to_string(),
            ToolDescription {
                description: "Fetch recent pod logs".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "pod": {"type": "string"},
                        "tail": {"type": "integer"}
                    }
                }),
                dangerous: false,
            },
        );
        tools.insert(
            "delete_pod".to_string(),
            ToolDescription {
                description: "Delete a pod".to_string(),
                parameters: json!({}),
                dangerous: true,
            },
        );
        tools
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn system_prompt_lists_tools_and_parameters() {
        let system = PromptBuilder::new().system_prompt(&catalogue()).unwrap();
        assert!(system.starts_with("You are an AI agent analyzing a Kubernetes cluster."));
        assert!(system.contains("- `get_logs`: Fetch recent pod logs"));
        assert!(system.contains("  Parameters: pod (string), tail (integer)"));
        assert!(system.contains("- `delete_pod`: Delete a pod (dangerous"));
        assert!(system.contains("\"type\": \"action\" | \"final_answer\""));
    }

    #[test]
    fn system_prompt_without_tools_says_so() {
        let system = PromptBuilder::new().system_prompt(&BTreeMap::new()).unwrap();
        assert!(system.contains("No tool descriptions available."));
    }

    #[test]
    fn tools_template_without_placeholder_is_an_error() {
        let builder = PromptBuilder::with_templates(PromptTemplates {
            tools: "Tools: none".to_string(),
            ..PromptTemplates::default()
        });
        assert!(matches!(
            builder.system_prompt(&catalogue()),
            Err(SleuthError::PromptError { .. })
        ));
    }

    #[test]
    fn user_prompt_without_history() {
        let state = AgentState::new(SessionId::new(), 3);
        let user = PromptBuilder::new()
            .user_prompt("Why is web crashing?", &Map::new(), &state, None)
            .unwrap();
        assert!(user.starts_with("Question: Why is web crashing?"));
        assert!(user.contains("\nContext:\n{\n  \"question\": \"Why is web crashing?\"\n}"));
        assert!(user.ends_with("\nAction History:\n(No actions taken yet)"));
    }

    #[test]
    fn user_prompt_appends_feedback() {
        let state = AgentState::new(SessionId::new(), 3);
        let user = PromptBuilder::new()
            .user_prompt("q", &Map::new(), &state, Some("use the JSON format"))
            .unwrap();
        assert!(user.ends_with("Feedback on last step: use the JSON format"));
    }

    #[test]
    fn history_renders_only_tool_entries_in_order() {
        let mut state = AgentState::new(SessionId::new(), 3);
        state.push(Interaction::model("thinking about pods"));
        state.push(Interaction::tool(
            Action::new("get_pods", params(json!({"namespace": "default"}))),
            ToolResult::success(json!(["web-1"]), 0.1),
        ));
        state.push(Interaction::tool(
            Action::new("get_logs", params(json!({"pod": "web-1"}))),
            ToolResult::failure("pod not found", 0.1),
        ));

        let user = PromptBuilder::new()
            .user_prompt("q", &Map::new(), &state, None)
            .unwrap();
        let first = user.find("Action 1:").unwrap();
        let second = user.find("Action 2:").unwrap();
        assert!(first < second);
        assert!(!user.contains("thinking about pods"));
        assert!(user.contains("\"error\": \"pod not found\""));
        assert!(!user.contains("(No actions taken yet)"));
    }

    #[test]
    fn rendered_action_round_trips_to_the_executed_action() {
        let action = Action {
            tool: "get_logs".to_string(),
            parameters: params(json!({"pod": "web-1", "tail": 50, "previous": true})),
            reasoning: "container restarts".to_string(),
            expected_result: "a stack trace".to_string(),
        };
        let mut state = AgentState::new(SessionId::new(), 3);
        state.push(Interaction::tool(action.clone(), ToolResult::success(json!("ok"), 0.0)));

        let user = PromptBuilder::new()
            .user_prompt("q", &Map::new(), &state, None)
            .unwrap();
        let block_start = user.find("Action 1:\n```json\n").unwrap() + "Action 1:\n```json\n".len();
        let block_end = block_start + user[block_start..].find("\n```").unwrap();
        let rendered: Action = serde_json::from_str(&user[block_start..block_end]).unwrap();
        assert_eq!(rendered, action);
    }
}
