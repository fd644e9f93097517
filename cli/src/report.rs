//! Plain-text rendering of an `InvestigationReport`.

use std::fmt::Write;

use sleuth_contracts::{
    execution::{InvestigationReport, Terminal},
    state::Role,
};

const RULE: &str = "=================================";

/// The tool calls made during the run, one line each.
fn render_trail(report: &InvestigationReport, out: &mut String) {
    let calls: Vec<_> = report
        .history
        .iter()
        .filter(|entry| entry.role == Role::Tool)
        .filter_map(|entry| Some((entry.action.as_ref()?, entry.tool_result()?)))
        .collect();
    if calls.is_empty() {
        return;
    }

    let _ = writeln!(out, "Actions taken:");
    for (index, (action, result)) in calls.iter().enumerate() {
        let status = match result.error() {
            None => "ok".to_string(),
            Some(error) => format!("failed: {error}"),
        };
        let _ = writeln!(
            out,
            "  [{}] {} {} ({:.2}s, {})",
            index + 1,
            action.tool,
            serde_json::Value::Object(action.parameters.clone()),
            result.execution_time(),
            status
        );
    }
    let _ = writeln!(out);
}

fn render_list(title: &str, items: &[String], out: &mut String) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}:");
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
    let _ = writeln!(out);
}

pub fn render(report: &InvestigationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "Investigation {}", report.session_id);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Outcome: {}  |  iterations: {}  |  {:.1}s",
        report.terminal.kind(),
        report.iterations,
        report.duration_secs
    );
    let _ = writeln!(out);

    render_trail(report, &mut out);

    match &report.terminal {
        Terminal::FinalAnswer(answer) => {
            let _ = writeln!(out, "Answer:");
            let _ = writeln!(out, "  {}", answer.main_response);
            let _ = writeln!(out);
            let _ = writeln!(out, "Confidence: {:.0}%", answer.confidence * 100.0);
            if !answer.reasoning.is_empty() {
                let _ = writeln!(out, "Reasoning: {}", answer.reasoning);
            }
            let _ = writeln!(out);
            render_list("Next steps", &answer.next_steps, &mut out);
            render_list("Analyzed components", &answer.analyzed_components, &mut out);
        }
        Terminal::MaxIterations { message } => {
            let _ = writeln!(out, "No conclusion: {message}");
        }
        Terminal::Aborted { reason } => {
            let _ = writeln!(out, "Aborted: {reason}");
        }
        Terminal::FatalError { message } => {
            let _ = writeln!(out, "Failed: {message}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use sleuth_contracts::{
        decision::{Action, FinalAnswer},
        state::{Interaction, SessionId},
        tool::ToolResult,
    };

    use super::*;

    fn report(terminal: Terminal, history: Vec<Interaction>) -> InvestigationReport {
        InvestigationReport {
            session_id: SessionId::new(),
            terminal,
            iterations: 2,
            history,
            duration_secs: 1.5,
        }
    }

    #[test]
    fn final_answer_lists_steps_and_components() {
        let mut params = Map::new();
        params.insert("namespace".to_string(), json!("default"));
        let history = vec![
            Interaction::model("checking pods"),
            Interaction::tool(
                Action::new("check_pod_status", params),
                ToolResult::success(json!({}), 0.25),
            ),
        ];
        let text = render(&report(
            Terminal::FinalAnswer(FinalAnswer {
                main_response: "api cannot reach its database".to_string(),
                confidence: 0.85,
                reasoning: "db-0 is Pending".to_string(),
                next_steps: vec!["free memory on node-2".to_string()],
                analyzed_components: vec!["pods".to_string(), "events".to_string()],
            }),
            history,
        ));

        assert!(text.contains("Outcome: final_answer"));
        assert!(text.contains("[1] check_pod_status {\"namespace\":\"default\"} (0.25s, ok)"));
        assert!(text.contains("Confidence: 85%"));
        assert!(text.contains("  - free memory on node-2"));
        assert!(text.contains("Analyzed components:\n  - pods\n  - events"));
    }

    #[test]
    fn abnormal_endings_show_their_reason() {
        let text = render(&report(
            Terminal::Aborted {
                reason: "User rejected action: delete_pod".to_string(),
            },
            Vec::new(),
        ));
        assert!(text.contains("Outcome: aborted"));
        assert!(text.contains("Aborted: User rejected action: delete_pod"));
        assert!(!text.contains("Actions taken"));
    }
}
