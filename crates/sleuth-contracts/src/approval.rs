//! Approval outcomes returned by the approval gate.

use serde::{Deserialize, Serialize};

/// The gate's answer for one proposed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// The action may run.
    Approved,
    /// A human declined this action, or did not answer in time.
    Rejected { reason: String },
    /// A human ended the whole investigation.
    Aborted { reason: String },
}

impl ApprovalOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalOutcome::Approved)
    }

    /// The reason carried by a non-approval, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ApprovalOutcome::Approved => None,
            ApprovalOutcome::Rejected { reason } | ApprovalOutcome::Aborted { reason } => {
                Some(reason)
            }
        }
    }
}
