//! Loop configuration, validated once at construction.

use std::time::Duration;

use sleuth_contracts::error::{SleuthError, SleuthResult};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Immutable settings for one `AgentLoop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    max_iterations: u32,
    /// Deadline for one completion call. `None` waits indefinitely.
    pub completion_timeout: Option<Duration>,
    /// Passed to every tool through its `ToolContext`.
    pub tool_timeout: Option<Duration>,
    /// Passed to every tool through its `ToolContext`.
    pub dry_run: bool,
}

impl LoopConfig {
    /// # Errors
    ///
    /// `ConfigError` if `max_iterations` is zero.
    pub fn new(max_iterations: u32) -> SleuthResult<Self> {
        if max_iterations == 0 {
            return Err(SleuthError::ConfigError {
                reason: "max_iterations must be a positive integer".to_string(),
            });
        }
        Ok(Self {
            max_iterations,
            completion_timeout: None,
            tool_timeout: None,
            dry_run: false,
        })
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Seconds as a `Duration`, treating zero as "no limit".
pub fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            completion_timeout: None,
            tool_timeout: None,
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_iterations_is_rejected() {
        assert!(matches!(LoopConfig::new(0), Err(SleuthError::ConfigError { .. })));
    }

    #[test]
    fn optional_secs_treats_zero_as_unbounded() {
        assert_eq!(optional_secs(0), None);
        assert_eq!(optional_secs(30), Some(Duration::from_secs(30)));
    }

    #[test]
    fn default_allows_ten_iterations() {
        assert_eq!(LoopConfig::default().max_iterations(), 10);
    }
}
