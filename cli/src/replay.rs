//! A completion service that replays recorded model responses.
//!
//! Used with `--replay` for offline runs against the mock cluster. The
//! script is a JSON array; string entries are returned verbatim and any other
//! entry is returned as its JSON text.

use std::{path::Path, sync::Mutex};

use serde_json::Value;
use tracing::debug;

use sleuth_contracts::error::{CompletionError, SleuthError, SleuthResult};
use sleuth_core::traits::CompletionService;

pub struct ReplayCompletion {
    responses: Vec<String>,
    next: Mutex<usize>,
}

impl ReplayCompletion {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            next: Mutex::new(0),
        }
    }

    pub fn from_json_str(s: &str) -> SleuthResult<Self> {
        let entries: Vec<Value> = serde_json::from_str(s).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to parse replay script: {}", e),
        })?;
        let responses = entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect();
        Ok(Self::new(responses))
    }

    pub fn from_file(path: &Path) -> SleuthResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to read replay file '{}': {}", path.display(), e),
        })?;
        Self::from_json_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl CompletionService for ReplayCompletion {
    fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, CompletionError> {
        let mut next = self
            .next
            .lock()
            .map_err(|_| CompletionError::Fatal("replay state poisoned".to_string()))?;
        let response = self.responses.get(*next).cloned().ok_or_else(|| {
            CompletionError::Fatal(format!(
                "replay script exhausted after {} responses",
                self.responses.len()
            ))
        })?;
        *next += 1;
        debug!(position = *next, total = self.responses.len(), "replaying response");
        Ok(response)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_replay_in_order_then_fail() {
        let replay = ReplayCompletion::from_json_str(
            r#"["plain text", {"type": "final_answer", "confidence": 1}]"#,
        )
        .unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay.complete("", "").unwrap(), "plain text");
        let second: Value = serde_json::from_str(&replay.complete("", "").unwrap()).unwrap();
        assert_eq!(second["type"], "final_answer");
        assert!(matches!(replay.complete("", ""), Err(CompletionError::Fatal(_))));
    }

    #[test]
    fn script_must_be_an_array() {
        assert!(ReplayCompletion::from_json_str(r#"{"type": "action"}"#).is_err());
    }
}
