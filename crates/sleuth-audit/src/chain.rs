//! Hash-chain primitives: hashing, appending and integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. session id as UTF-8 bytes (hyphenated UUID)
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. canonical JSON of the entry (serde_json, no pretty-printing)

use sha2::{Digest, Sha256};

use sleuth_contracts::{
    error::{SleuthError, SleuthResult},
    state::SessionId,
};

use crate::event::{AuditEvent, LogEntry};

/// Compute the SHA-256 hash for one chain link. Lowercase 64-char hex.
///
/// # Errors
///
/// `ExecutionLogFailed` if the entry cannot be serialized.
pub fn hash_event(
    session_id: &SessionId,
    sequence: u64,
    entry: &LogEntry,
    prev_hash: &str,
) -> SleuthResult<String> {
    let entry_json = serde_json::to_vec(entry).map_err(|e| SleuthError::ExecutionLogFailed {
        reason: format!("failed to serialize log entry: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(session_id.to_string().as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&entry_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of one session's chain.
///
/// Valid when every event links to its predecessor (`GENESIS_HASH` for the
/// first), carries the expected sequence number, and its `this_hash`
/// matches the value recomputed from its own fields. An empty chain is
/// valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut expected_prev = AuditEvent::GENESIS_HASH.to_string();

    for (position, event) in events.iter().enumerate() {
        if event.sequence != position as u64 || event.prev_hash != expected_prev {
            return false;
        }

        match hash_event(&event.session_id, event.sequence, &event.entry, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }

        expected_prev = event.this_hash.clone();
    }

    true
}

/// Tail of one session's chain: the next sequence and the last hash.
#[derive(Debug, Clone)]
pub(crate) struct ChainCursor {
    pub(crate) sequence: u64,
    pub(crate) last_hash: String,
    pub(crate) finalized: bool,
}

impl Default for ChainCursor {
    fn default() -> Self {
        Self {
            sequence: 0,
            last_hash: AuditEvent::GENESIS_HASH.to_string(),
            finalized: false,
        }
    }
}

impl ChainCursor {
    /// Build the next link without advancing. Call `advance` once the event
    /// has been stored.
    pub(crate) fn link(&self, session_id: &SessionId, entry: LogEntry) -> SleuthResult<AuditEvent> {
        if self.finalized {
            return Err(SleuthError::ExecutionLogFailed {
                reason: format!("session {} is already finalized", session_id),
            });
        }
        let this_hash = hash_event(session_id, self.sequence, &entry, &self.last_hash)?;
        Ok(AuditEvent {
            sequence: self.sequence,
            session_id: session_id.clone(),
            entry,
            prev_hash: self.last_hash.clone(),
            this_hash,
        })
    }

    pub(crate) fn advance(&mut self, event: &AuditEvent) {
        self.sequence += 1;
        self.last_hash = event.this_hash.clone();
        if matches!(event.entry, LogEntry::Finalized { .. }) {
            self.finalized = true;
        }
    }
}
