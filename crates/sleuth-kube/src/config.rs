//! kubectl settings (`[kubectl]` table).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
    /// Binary to run.
    pub path: String,
    /// Passed as `--context`. The current kubeconfig context when absent.
    pub context: Option<String>,
    /// Namespace used when a tool call names none.
    pub namespace: String,
    /// Per-command limit. `0` disables it.
    pub timeout_secs: u64,
    /// Output beyond this many lines is cut off.
    pub max_output_lines: usize,
    /// Namespaces tools may touch. `"*"` allows all.
    pub allowed_namespaces: Vec<String>,
    /// Resource kinds the generic `kubectl` tool refuses to read.
    pub restricted_resources: Vec<String>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            path: "kubectl".to_string(),
            context: None,
            namespace: "default".to_string(),
            timeout_secs: 30,
            max_output_lines: 1000,
            allowed_namespaces: vec!["default".to_string()],
            restricted_resources: vec!["secrets".to_string()],
        }
    }
}

impl KubectlConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn namespace_allowed(&self, namespace: &str) -> bool {
        self.allowed_namespaces
            .iter()
            .any(|allowed| allowed == "*" || allowed == namespace)
    }

    pub fn all_namespaces_allowed(&self) -> bool {
        self.allowed_namespaces.iter().any(|allowed| allowed == "*")
    }

    /// True when `token` names a restricted resource, alone or as part of a
    /// `kind/name` or comma-separated list.
    pub fn is_restricted(&self, token: &str) -> bool {
        token
            .split(',')
            .map(|part| part.split('/').next().unwrap_or(part))
            .any(|kind| {
                self.restricted_resources.iter().any(|restricted| {
                    kind.eq_ignore_ascii_case(restricted)
                        || kind.eq_ignore_ascii_case(restricted.trim_end_matches('s'))
                })
            })
    }
}
