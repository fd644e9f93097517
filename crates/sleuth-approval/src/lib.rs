//! # sleuth-approval
//!
//! The human-in-the-loop approval gate for kubesleuth.
//!
//! [`PolicyApprovalGate`] implements the
//! [`ApprovalGate`](sleuth_core::traits::ApprovalGate) trait from a TOML
//! [`ApprovalConfig`]. When the configuration does not settle a request on
//! its own, the gate asks a human through an [`ApprovalPort`]; the shipped
//! port is [`ConsoleApprovalPort`], a line-oriented terminal prompt with a
//! bounded wait.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sleuth_approval::{ApprovalConfig, ConsoleApprovalPort, PolicyApprovalGate};
//!
//! let config = ApprovalConfig::from_toml_str("auto_approve_safe = true")?;
//! let gate = PolicyApprovalGate::new(config, Box::new(ConsoleApprovalPort::stdio()?));
//! ```

pub mod config;
pub mod console;
pub mod gate;
pub mod port;

pub use config::ApprovalConfig;
pub use console::ConsoleApprovalPort;
pub use gate::PolicyApprovalGate;
pub use port::{ApprovalPort, ApprovalRequest, HumanResponse, RiskLevel};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sleuth_contracts::error::SleuthError;

    use crate::ApprovalConfig;

    #[test]
    fn empty_document_gives_conservative_defaults() {
        let config = ApprovalConfig::from_toml_str("").unwrap();
        assert!(config.hitl_enabled);
        assert!(!config.auto_approve_all);
        assert!(!config.auto_approve_safe);
        assert_eq!(config.timeout_secs, 300);
        assert!(config.is_safe("get_logs"));
        assert!(config.is_dangerous("delete_pod"));
        assert!(!config.is_safe("delete_pod"));
    }

    #[test]
    fn lists_replace_the_defaults() {
        let toml = r#"
            auto_approve_safe = true
            safe_tools = ["get_logs"]
            dangerous_tools = []
        "#;
        let config = ApprovalConfig::from_toml_str(toml).unwrap();
        assert!(config.auto_approve_safe);
        assert!(config.is_safe("get_logs"));
        assert!(!config.is_safe("describe_pod"));
        assert!(!config.is_dangerous("delete_pod"));
    }

    #[test]
    fn zero_timeout_waits_indefinitely() {
        let config = ApprovalConfig::from_toml_str("timeout_secs = 0").unwrap();
        assert_eq!(config.timeout(), None);
        assert_eq!(
            ApprovalConfig::default().timeout(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn wrong_field_type_is_a_config_error() {
        let result = ApprovalConfig::from_toml_str("hitl_enabled = \"sometimes\"");
        match result {
            Err(SleuthError::ConfigError { reason }) => {
                assert!(reason.contains("approval TOML"), "got: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = ApprovalConfig::from_file(std::path::Path::new("/nonexistent/approval.toml"));
        assert!(matches!(result, Err(SleuthError::ConfigError { .. })));
    }
}
