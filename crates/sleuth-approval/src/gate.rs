//! Policy-driven approval gate.
//!
//! Evaluation order, first match wins:
//!
//! 1. `auto_approve_all` → Approved.
//! 2. HITL disabled → Approved.
//! 3. `auto_approve_safe`, tool is safe-listed and **not** dangerous-listed
//!    → Approved.
//! 4. Ask a human through the `ApprovalPort`.
//!
//! A tool on both lists always reaches step 4: the dangerous set wins.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use sleuth_contracts::{approval::ApprovalOutcome, decision::Action, error::SleuthResult};
use sleuth_core::traits::ApprovalGate;

use crate::{
    config::ApprovalConfig,
    port::{ApprovalPort, ApprovalRequest, HumanResponse, RiskLevel},
};

pub struct PolicyApprovalGate {
    config: ApprovalConfig,
    port: Box<dyn ApprovalPort>,
}

impl PolicyApprovalGate {
    pub fn new(config: ApprovalConfig, port: Box<dyn ApprovalPort>) -> Self {
        Self { config, port }
    }

    /// Add tool names to the dangerous set, typically the registry's
    /// `dangerous_tools()` at startup.
    pub fn mark_dangerous<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .dangerous_tools
            .extend(names.into_iter().map(Into::into));
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    fn risk(&self, tool: &str) -> RiskLevel {
        if self.config.is_dangerous(tool) {
            RiskLevel::Dangerous
        } else if self.config.is_safe(tool) {
            RiskLevel::Safe
        } else {
            RiskLevel::Unclassified
        }
    }

    /// Steps 1–3. `Some` when no human is needed.
    fn unattended(&self, tool: &str) -> Option<&'static str> {
        if self.config.auto_approve_all {
            return Some("auto-approve enabled");
        }
        if !self.config.hitl_enabled {
            return Some("HITL disabled");
        }
        if self.config.auto_approve_safe
            && self.config.is_safe(tool)
            && !self.config.is_dangerous(tool)
        {
            return Some("safe action");
        }
        None
    }

    fn ask_human(&self, request: &ApprovalRequest) -> SleuthResult<ApprovalOutcome> {
        let tool = &request.action.tool;
        self.port.present(request)?;

        let deadline = self.config.timeout().map(|t| Instant::now() + t);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let response = if remaining == Some(Duration::ZERO) {
                HumanResponse::TimedOut
            } else {
                self.port.ask(remaining)?
            };

            match response {
                HumanResponse::Approve => {
                    info!(tool = %tool, "user approved action");
                    return Ok(ApprovalOutcome::Approved);
                }
                HumanResponse::Reject => {
                    info!(tool = %tool, "user rejected action");
                    return Ok(ApprovalOutcome::Rejected {
                        reason: format!("User rejected action: {tool}"),
                    });
                }
                HumanResponse::Details => {
                    debug!(tool = %tool, "showing full action details");
                    self.port.show_details(request)?;
                }
                HumanResponse::Abort => {
                    info!(tool = %tool, "user chose to abort the investigation");
                    return Ok(ApprovalOutcome::Aborted {
                        reason: "User aborted execution.".to_string(),
                    });
                }
                HumanResponse::InputClosed => {
                    warn!(tool = %tool, "approval input closed; aborting");
                    return Ok(ApprovalOutcome::Aborted {
                        reason: "Execution aborted due to closed input stream.".to_string(),
                    });
                }
                HumanResponse::TimedOut => {
                    warn!(
                        tool = %tool,
                        timeout_secs = self.config.timeout_secs,
                        "no approval response in time; rejecting"
                    );
                    return Ok(ApprovalOutcome::Rejected {
                        reason: format!(
                            "No approval response within {}s for action: {tool}",
                            self.config.timeout_secs
                        ),
                    });
                }
            }
        }
    }
}

impl ApprovalGate for PolicyApprovalGate {
    fn authorize(&self, action: &Action) -> SleuthResult<ApprovalOutcome> {
        if let Some(why) = self.unattended(&action.tool) {
            info!(tool = %action.tool, reason = why, "auto-approving action");
            return Ok(ApprovalOutcome::Approved);
        }

        let request = ApprovalRequest {
            action: action.clone(),
            risk: self.risk(&action.tool),
        };
        debug!(tool = %action.tool, risk = %request.risk, "requesting human approval");
        self.ask_human(&request)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use serde_json::Map;
    use sleuth_contracts::error::SleuthError;

    use super::*;

    // ── Scripted port ─────────────────────────────────────────────────────────

    #[derive(Default)]
    struct PortLog {
        presented: Vec<(String, RiskLevel)>,
        asks: usize,
        details_shown: usize,
    }

    /// Replays a fixed list of answers; `TimedOut` once the script runs dry.
    struct ScriptedPort {
        answers: Mutex<VecDeque<HumanResponse>>,
        log: Arc<Mutex<PortLog>>,
    }

    impl ScriptedPort {
        fn new(answers: &[HumanResponse]) -> (Self, Arc<Mutex<PortLog>>) {
            let log = Arc::new(Mutex::new(PortLog::default()));
            let port = Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                log: Arc::clone(&log),
            };
            (port, log)
        }
    }

    impl ApprovalPort for ScriptedPort {
        fn present(&self, request: &ApprovalRequest) -> SleuthResult<()> {
            self.log
                .lock()
                .unwrap()
                .presented
                .push((request.action.tool.clone(), request.risk));
            Ok(())
        }

        fn ask(&self, _timeout: Option<Duration>) -> SleuthResult<HumanResponse> {
            self.log.lock().unwrap().asks += 1;
            Ok(self
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(HumanResponse::TimedOut))
        }

        fn show_details(&self, _request: &ApprovalRequest) -> SleuthResult<()> {
            self.log.lock().unwrap().details_shown += 1;
            Ok(())
        }
    }

    struct BrokenPort;

    impl ApprovalPort for BrokenPort {
        fn present(&self, _request: &ApprovalRequest) -> SleuthResult<()> {
            Err(SleuthError::ApprovalFailed {
                reason: "terminal went away".to_string(),
            })
        }

        fn ask(&self, _timeout: Option<Duration>) -> SleuthResult<HumanResponse> {
            unreachable!("present already failed")
        }

        fn show_details(&self, _request: &ApprovalRequest) -> SleuthResult<()> {
            Ok(())
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn action(tool: &str) -> Action {
        Action::new(tool, Map::new())
    }

    fn config(safe: &[&str], dangerous: &[&str]) -> ApprovalConfig {
        ApprovalConfig {
            safe_tools: safe.iter().map(|s| s.to_string()).collect(),
            dangerous_tools: dangerous.iter().map(|s| s.to_string()).collect(),
            ..ApprovalConfig::default()
        }
    }

    fn gate(config: ApprovalConfig, answers: &[HumanResponse]) -> (PolicyApprovalGate, Arc<Mutex<PortLog>>) {
        let (port, log) = ScriptedPort::new(answers);
        (PolicyApprovalGate::new(config, Box::new(port)), log)
    }

    // ── Unattended approval ───────────────────────────────────────────────────

    #[test]
    fn auto_approve_all_skips_the_human_even_for_dangerous_tools() {
        let cfg = ApprovalConfig {
            auto_approve_all: true,
            ..config(&[], &["delete_pod"])
        };
        let (gate, log) = gate(cfg, &[]);
        assert_eq!(gate.authorize(&action("delete_pod")).unwrap(), ApprovalOutcome::Approved);
        assert!(log.lock().unwrap().presented.is_empty());
    }

    #[test]
    fn hitl_disabled_approves_everything() {
        let cfg = ApprovalConfig {
            hitl_enabled: false,
            ..config(&[], &["delete_pod"])
        };
        let (gate, log) = gate(cfg, &[]);
        assert!(gate.authorize(&action("delete_pod")).unwrap().is_approved());
        assert_eq!(log.lock().unwrap().asks, 0);
    }

    #[test]
    fn safe_tool_is_auto_approved_when_enabled() {
        let cfg = ApprovalConfig {
            auto_approve_safe: true,
            ..config(&["get_logs"], &[])
        };
        let (gate, log) = gate(cfg, &[]);
        assert!(gate.authorize(&action("get_logs")).unwrap().is_approved());
        assert!(log.lock().unwrap().presented.is_empty());
    }

    #[test]
    fn safe_tool_still_asks_when_safe_auto_approval_is_off() {
        let (gate, log) = gate(config(&["get_logs"], &[]), &[HumanResponse::Approve]);
        assert!(gate.authorize(&action("get_logs")).unwrap().is_approved());
        assert_eq!(log.lock().unwrap().presented, vec![("get_logs".to_string(), RiskLevel::Safe)]);
    }

    // ── Dangerous set precedence ──────────────────────────────────────────────

    #[test]
    fn dangerous_listing_beats_safe_listing() {
        let cfg = ApprovalConfig {
            auto_approve_safe: true,
            ..config(&["delete_pod"], &["delete_pod"])
        };
        let (gate, log) = gate(cfg, &[HumanResponse::Reject]);

        let outcome = gate.authorize(&action("delete_pod")).unwrap();

        assert_eq!(
            outcome,
            ApprovalOutcome::Rejected {
                reason: "User rejected action: delete_pod".to_string()
            }
        );
        let log = log.lock().unwrap();
        assert_eq!(log.presented, vec![("delete_pod".to_string(), RiskLevel::Dangerous)]);
    }

    #[test]
    fn mark_dangerous_widens_the_dangerous_set() {
        let cfg = ApprovalConfig {
            auto_approve_safe: true,
            ..config(&["restart_pod"], &[])
        };
        let (mut gate, log) = gate(cfg, &[HumanResponse::Approve]);
        gate.mark_dangerous(["restart_pod"]);

        assert!(gate.authorize(&action("restart_pod")).unwrap().is_approved());
        assert_eq!(log.lock().unwrap().asks, 1);
    }

    // ── Human answers ─────────────────────────────────────────────────────────

    #[test]
    fn unclassified_tool_reaches_the_human() {
        let (gate, log) = gate(config(&[], &[]), &[HumanResponse::Approve]);
        assert!(gate.authorize(&action("kubectl")).unwrap().is_approved());
        assert_eq!(log.lock().unwrap().presented[0].1, RiskLevel::Unclassified);
    }

    #[test]
    fn details_shows_payload_and_asks_again() {
        let (gate, log) = gate(
            config(&[], &[]),
            &[HumanResponse::Details, HumanResponse::Details, HumanResponse::Approve],
        );
        assert!(gate.authorize(&action("kubectl")).unwrap().is_approved());
        let log = log.lock().unwrap();
        assert_eq!(log.details_shown, 2);
        assert_eq!(log.asks, 3);
        assert_eq!(log.presented.len(), 1);
    }

    #[test]
    fn abort_ends_the_investigation() {
        let (gate, _) = gate(config(&[], &[]), &[HumanResponse::Abort]);
        assert_eq!(
            gate.authorize(&action("kubectl")).unwrap(),
            ApprovalOutcome::Aborted {
                reason: "User aborted execution.".to_string()
            }
        );
    }

    #[test]
    fn closed_input_aborts() {
        let (gate, _) = gate(config(&[], &[]), &[HumanResponse::InputClosed]);
        let outcome = gate.authorize(&action("kubectl")).unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Aborted { reason } if reason.contains("closed input")));
    }

    #[test]
    fn timeout_is_a_rejection() {
        let (gate, _) = gate(config(&[], &[]), &[HumanResponse::TimedOut]);
        let outcome = gate.authorize(&action("kubectl")).unwrap();
        assert!(matches!(
            outcome,
            ApprovalOutcome::Rejected { reason } if reason.starts_with("No approval response within 300s")
        ));
    }

    #[test]
    fn port_failure_propagates() {
        let gate = PolicyApprovalGate::new(config(&[], &[]), Box::new(BrokenPort));
        assert!(matches!(
            gate.authorize(&action("kubectl")),
            Err(SleuthError::ApprovalFailed { .. })
        ));
    }
}
