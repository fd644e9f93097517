//! Approval configuration schema.
//!
//! Deserialized from the `[approval]` table of the kubesleuth config file, or
//! from a standalone TOML document. Every field has a default, so an empty
//! document yields the conservative configuration: HITL on, nothing
//! auto-approved.
//!
//! Example:
//! ```toml
//! hitl_enabled = true
//! auto_approve_safe = true
//! timeout_secs = 120
//! safe_tools = ["get_logs", "describe_pod"]
//! dangerous_tools = ["delete_pod"]
//! ```

use std::{collections::BTreeSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use sleuth_contracts::error::{SleuthError, SleuthResult};

const DEFAULT_SAFE_TOOLS: &[&str] = &[
    "get_pods",
    "get_nodes",
    "get_services",
    "describe_pod",
    "describe_node",
    "get_events",
    "get_logs",
    "check_pod_status",
    "check_node_status",
    "check_cluster_events",
];

const DEFAULT_DANGEROUS_TOOLS: &[&str] = &[
    "delete_pod",
    "drain_node",
    "scale_deployment",
    "rollback_deployment",
    "exec_pod",
];

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Approve every action without asking. Overrides everything else.
    pub auto_approve_all: bool,

    /// When false, no human is ever asked and every action is approved.
    pub hitl_enabled: bool,

    /// Approve tools in `safe_tools` that are not also in `dangerous_tools`.
    pub auto_approve_safe: bool,

    pub safe_tools: BTreeSet<String>,

    /// Always reach a human while HITL is on, even if also listed as safe.
    pub dangerous_tools: BTreeSet<String>,

    /// How long to wait for a human answer. `0` waits indefinitely.
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_all: false,
            hitl_enabled: true,
            auto_approve_safe: false,
            safe_tools: DEFAULT_SAFE_TOOLS.iter().map(|s| s.to_string()).collect(),
            dangerous_tools: DEFAULT_DANGEROUS_TOOLS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ApprovalConfig {
    /// Parse `s` as a TOML approval table.
    ///
    /// Returns `SleuthError::ConfigError` if the TOML is malformed or has
    /// fields of the wrong type.
    pub fn from_toml_str(s: &str) -> SleuthResult<Self> {
        toml::from_str(s).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to parse approval TOML: {}", e),
        })
    }

    pub fn from_file(path: &Path) -> SleuthResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to read approval file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn is_safe(&self, tool: &str) -> bool {
        self.safe_tools.contains(tool)
    }

    pub fn is_dangerous(&self, tool: &str) -> bool {
        self.dangerous_tools.contains(tool)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
