//! The human side of the approval gate.
//!
//! `ApprovalPort` is the request/response boundary between the gate and
//! whoever answers: a terminal, a chat callback, a test script. The gate owns
//! the policy and the re-prompt loop; a port only displays and collects.

use std::{fmt, time::Duration};

use serde::Serialize;

use sleuth_contracts::{decision::Action, error::SleuthResult};

/// How the configuration classifies the proposed tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Unclassified,
    Dangerous,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Unclassified => "unclassified",
            RiskLevel::Dangerous => "dangerous",
        };
        f.write_str(label)
    }
}

/// One action awaiting a human decision.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub action: Action,
    pub risk: RiskLevel,
}

/// A single answer collected by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanResponse {
    Approve,
    Reject,
    /// Show the full action payload, then ask again.
    Details,
    Abort,
    /// The input stream ended before an answer arrived.
    InputClosed,
    /// No answer arrived within the allotted time.
    TimedOut,
}

pub trait ApprovalPort: Send + Sync {
    /// Show the proposed action. Called once per request.
    fn present(&self, request: &ApprovalRequest) -> SleuthResult<()>;

    /// Wait for one answer. `None` waits indefinitely.
    fn ask(&self, timeout: Option<Duration>) -> SleuthResult<HumanResponse>;

    /// Show the complete action payload after a `Details` answer.
    fn show_details(&self, request: &ApprovalRequest) -> SleuthResult<()>;
}
