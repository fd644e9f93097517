//! The `sleuth` configuration document.
//!
//! One TOML file with optional `[agent]`, `[approval]`, `[llm]`, `[kubectl]`
//! and `[prompts]` tables. Environment variables override the file, and
//! command line flags override both.

use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::debug;

use sleuth_approval::ApprovalConfig;
use sleuth_contracts::error::{SleuthError, SleuthResult};
use sleuth_core::{
    config::{optional_secs, DEFAULT_MAX_ITERATIONS},
    LoopConfig, PromptTemplates,
};
use sleuth_kube::KubectlConfig;
use sleuth_llm::{LlmConfig, Provider};

/// `[agent]`: the loop itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: u32,
    /// Deadline for one completion call. `0` waits indefinitely.
    pub thought_timeout_secs: u64,
    /// Deadline handed to every tool. `0` leaves it to the tool.
    pub action_timeout_secs: u64,
    /// Mutating tools only simulate.
    pub dry_run: bool,
    /// Directory for `react_execution_<session>.jsonl` files. Logs stay in
    /// memory when absent.
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            thought_timeout_secs: 30,
            action_timeout_secs: 60,
            dry_run: false,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SleuthConfig {
    pub agent: AgentSection,
    pub approval: ApprovalConfig,
    pub llm: LlmConfig,
    pub kubectl: KubectlConfig,
    pub prompts: Option<PromptTemplates>,
}

impl SleuthConfig {
    pub fn from_toml_str(s: &str) -> SleuthResult<Self> {
        toml::from_str(s).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to parse sleuth TOML: {}", e),
        })
    }

    pub fn from_file(path: &std::path::Path) -> SleuthResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply the environment overrides. `env` is `|k| std::env::var(k).ok()`
    /// in production.
    ///
    /// # Errors
    ///
    /// `ConfigError` naming the variable when a value does not parse.
    pub fn apply_env<F>(&mut self, env: F) -> SleuthResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            env(key).filter(|v| !v.trim().is_empty()).map(|v| {
                debug!(variable = key, "environment override");
                v.trim().to_string()
            })
        };

        if let Some(v) = get("REACT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse("REACT_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = get("REACT_THOUGHT_TIMEOUT") {
            self.agent.thought_timeout_secs = parse("REACT_THOUGHT_TIMEOUT", &v)?;
        }
        if let Some(v) = get("REACT_ACTION_TIMEOUT") {
            self.agent.action_timeout_secs = parse("REACT_ACTION_TIMEOUT", &v)?;
        }
        if let Some(v) = get("TOOL_DRY_RUN_DEFAULT") {
            self.agent.dry_run = flag(&v);
        }

        if let Some(v) = get("REACT_HITL_ENABLED") {
            self.approval.hitl_enabled = flag(&v);
        }
        if let Some(v) = get("REACT_HITL_AUTO_APPROVE_SAFE") {
            self.approval.auto_approve_safe = flag(&v);
        }
        if let Some(v) = get("REACT_AUTO_APPROVE_ACTIONS") {
            self.approval.auto_approve_all = flag(&v);
        }
        if let Some(v) = get("REACT_HITL_TIMEOUT") {
            self.approval.timeout_secs = parse("REACT_HITL_TIMEOUT", &v)?;
        }

        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = v.parse::<Provider>()?;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = Some(v);
        }

        if let Some(v) = get("KUBECTL_PATH") {
            self.kubectl.path = v;
        }
        if let Some(v) = get("KUBECTL_CONTEXT") {
            self.kubectl.context = Some(v);
        }
        if let Some(v) = get("KUBECTL_NAMESPACE") {
            self.kubectl.namespace = v;
        }
        if let Some(v) = get("KUBECTL_TIMEOUT") {
            self.kubectl.timeout_secs = parse("KUBECTL_TIMEOUT", &v)?;
        }
        if let Some(v) = get("KUBECTL_MAX_LINES") {
            self.kubectl.max_output_lines = parse("KUBECTL_MAX_LINES", &v)?;
        }
        if let Some(v) = get("TOOL_ALLOWED_NAMESPACES") {
            self.kubectl.allowed_namespaces = list(&v);
        }
        if let Some(v) = get("TOOL_RESTRICTED_RESOURCES") {
            self.kubectl.restricted_resources = list(&v);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `ConfigError` when `max_iterations` is zero.
    pub fn loop_config(&self) -> SleuthResult<LoopConfig> {
        Ok(LoopConfig::new(self.agent.max_iterations)?
            .with_completion_timeout(optional_secs(self.agent.thought_timeout_secs))
            .with_tool_timeout(optional_secs(self.agent.action_timeout_secs))
            .with_dry_run(self.agent.dry_run))
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> SleuthResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| SleuthError::ConfigError {
        reason: format!("invalid value '{value}' for {key}: {e}"),
    })
}

/// Only `true`, in any case, switches a flag on.
fn flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
