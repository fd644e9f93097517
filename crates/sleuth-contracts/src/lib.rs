//! # sleuth-contracts
//!
//! Shared types for the kubesleuth investigation loop.
//!
//! Every crate in the workspace imports from here. No business logic lives in
//! this crate, only data definitions, invariant-preserving constructors and
//! error types.

pub mod approval;
pub mod decision;
pub mod error;
pub mod execution;
pub mod params;
pub mod state;
pub mod tool;

#[cfg(test)]
mod tests {
    use super::*;
    use approval::ApprovalOutcome;
    use decision::{Action, Decision, FinalAnswer};
    use error::{CompletionError, SleuthError};
    use execution::Terminal;
    use serde_json::json;
    use state::{AgentState, Interaction, Role, SessionId};
    use tool::ToolResult;

    fn params(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    // ── ToolResult ───────────────────────────────────────────────────────────

    #[test]
    fn tool_result_success_carries_data_and_no_error() {
        let result = ToolResult::success(json!({"pods": 3}), 0.25);
        assert!(result.is_success());
        assert_eq!(result.data(), Some(&json!({"pods": 3})));
        assert!(result.error().is_none());
        assert_eq!(result.execution_time(), 0.25);
    }

    #[test]
    fn tool_result_failure_carries_error_and_no_data() {
        let result = ToolResult::failure("kubectl not found", 0.0);
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("kubectl not found"));
        assert!(result.data().is_none());
    }

    #[test]
    fn tool_result_metadata_overwrites_same_key() {
        let result = ToolResult::success(json!(null), 0.0)
            .with_metadata("tool", json!("first"))
            .with_metadata("tool", json!("second"));
        assert_eq!(result.metadata().get("tool"), Some(&json!("second")));
        assert_eq!(result.metadata().len(), 1);
    }

    #[test]
    fn tool_result_serialization_omits_absent_side() {
        let failed = serde_json::to_value(ToolResult::failure("boom", 0.1)).unwrap();
        assert!(failed.get("data").is_none());
        assert_eq!(failed["error"], json!("boom"));
        assert_eq!(failed["success"], json!(false));
    }

    #[test]
    fn tool_result_null_data_survives_round_trip() {
        let result = ToolResult::success(json!(null), 0.0);
        let text = serde_json::to_string(&result).unwrap();
        let back: ToolResult = serde_json::from_str(&text).unwrap();
        assert!(back.is_success());
        assert_eq!(back.data(), Some(&json!(null)));
        assert_eq!(back, result);
    }

    // ── AgentState ───────────────────────────────────────────────────────────

    #[test]
    fn agent_state_starts_empty() {
        let state = AgentState::new(SessionId::new(), 5);
        assert_eq!(state.iteration(), 0);
        assert!(state.history().is_empty());
        assert!(!state.has_reached_max_iterations());
    }

    #[test]
    fn agent_state_reaches_max_after_advancing() {
        let mut state = AgentState::new(SessionId::new(), 2);
        state.advance();
        assert!(!state.has_reached_max_iterations());
        state.advance();
        assert!(state.has_reached_max_iterations());
        assert_eq!(state.iteration(), 2);
    }

    #[test]
    fn agent_state_history_preserves_insertion_order() {
        let mut state = AgentState::new(SessionId::new(), 3);
        state.push(Interaction::model("first"));
        state.push(Interaction::feedback("second"));
        state.push(Interaction::tool(
            Action::new("get_pods", params(json!({"namespace": "default"}))),
            ToolResult::success(json!([]), 0.0),
        ));

        let roles: Vec<Role> = state.history().iter().map(|i| i.role).collect();
        assert_eq!(roles, vec![Role::Model, Role::Feedback, Role::Tool]);
        assert_eq!(state.history()[0].text(), Some("first"));
        assert!(state.history()[2].tool_result().is_some());
        assert_eq!(
            state.history()[2].action.as_ref().map(|a| a.tool.as_str()),
            Some("get_pods")
        );
    }

    // ── SessionId ────────────────────────────────────────────────────────────

    #[test]
    fn session_id_new_produces_unique_values() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| SessionId::new().to_string()).collect();
        assert_eq!(ids.len(), 100);
    }

    // ── Decision serde ───────────────────────────────────────────────────────

    #[test]
    fn action_defaults_missing_parameters_to_empty_map() {
        let action: Action = serde_json::from_value(json!({"tool": "get_nodes"})).unwrap();
        assert!(action.parameters.is_empty());
        assert_eq!(action.reasoning, "");
    }

    #[test]
    fn decision_is_tagged_by_type() {
        let decision = Decision::FinalAnswer(FinalAnswer {
            main_response: "ok".into(),
            confidence: 0.9,
            reasoning: "x".into(),
            next_steps: vec![],
            analyzed_components: vec![],
        });
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["type"], json!("final_answer"));
        assert_eq!(decision.kind(), "final_answer");
    }

    // ── Terminal / ApprovalOutcome ──────────────────────────────────────────

    #[test]
    fn terminal_kinds_and_success() {
        let aborted = Terminal::Aborted {
            reason: "user said no".into(),
        };
        assert_eq!(aborted.kind(), "aborted");
        assert!(!aborted.is_success());
        let json = serde_json::to_value(&aborted).unwrap();
        assert_eq!(json["type"], json!("aborted"));
        assert_eq!(json["reason"], json!("user said no"));
    }

    #[test]
    fn approval_outcome_reason() {
        assert!(ApprovalOutcome::Approved.is_approved());
        assert_eq!(ApprovalOutcome::Approved.reason(), None);
        let rejected = ApprovalOutcome::Rejected {
            reason: "timeout".into(),
        };
        assert_eq!(rejected.reason(), Some("timeout"));
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    #[test]
    fn error_malformed_response_display() {
        let err = SleuthError::MalformedResponse {
            reason: "no JSON block".into(),
            raw: "hello".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("malformed model response"));
        assert!(msg.contains("no JSON block"));
    }

    #[test]
    fn error_tool_not_found_display() {
        let err = SleuthError::ToolNotFound {
            name: "list_pods".into(),
        };
        assert!(err.to_string().contains("list_pods"));
    }

    #[test]
    fn completion_error_converts_transparently() {
        let err: SleuthError = CompletionError::Fatal("invalid api key".into()).into();
        assert!(err.to_string().contains("invalid api key"));
    }

    #[test]
    fn only_fatal_completion_errors_are_unrecoverable() {
        assert!(CompletionError::Unavailable("503".into()).is_recoverable());
        assert!(CompletionError::RateLimited { retries: 3 }.is_recoverable());
        assert!(
            CompletionError::Timeout(std::time::Duration::from_secs(1)).is_recoverable()
        );
        assert!(!CompletionError::Fatal("401".into()).is_recoverable());
    }
}
