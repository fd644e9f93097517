//! Execution log entry and sealed-log types.
//!
//! `AuditEvent` is one link in a session's hash chain. It wraps either an
//! `IterationRecord` or the session's closing `Terminal`, with a sequence
//! number and the SHA-256 hashes that make tampering detectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sleuth_contracts::{
    execution::{IterationRecord, Terminal},
    state::SessionId,
};

/// What one chain link carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum LogEntry {
    Iteration { record: IterationRecord },
    /// Written once by `finalize`; nothing follows it.
    Finalized { terminal: Terminal },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the session's chain, starting at 0.
    pub sequence: u64,

    pub session_id: SessionId,

    pub entry: LogEntry,

    /// `this_hash` of the previous event, or `GENESIS_HASH` for the first.
    pub prev_hash: String,

    /// SHA-256 (hex) over session id, sequence, prev_hash and the entry's
    /// canonical JSON.
    pub this_hash: String,
}

impl AuditEvent {
    /// The `prev_hash` of the first event in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    pub fn record(&self) -> Option<&IterationRecord> {
        match &self.entry {
            LogEntry::Iteration { record } => Some(record),
            LogEntry::Finalized { .. } => None,
        }
    }
}

/// A snapshot of one session's chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub session_id: SessionId,

    /// All events in chain order (sequence 0 first).
    pub events: Vec<AuditEvent>,

    pub exported_at: DateTime<Utc>,

    /// `this_hash` of the last event. Empty if the log is empty.
    pub terminal_hash: String,
}

impl AuditLog {
    pub fn is_finalized(&self) -> bool {
        matches!(
            self.events.last().map(|e| &e.entry),
            Some(LogEntry::Finalized { .. })
        )
    }
}
