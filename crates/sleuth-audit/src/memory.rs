//! In-memory implementation of `ExecutionLog`.
//!
//! Keeps one hash chain per session behind an `Arc<Mutex<_>>`, so a clone
//! of the handle can inspect or export chains while the loop is writing.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use tracing::{debug, info};

use sleuth_contracts::{
    error::{SleuthError, SleuthResult},
    execution::{IterationRecord, Terminal},
    state::SessionId,
};
use sleuth_core::traits::ExecutionLog;

use crate::{
    chain::{verify_chain, ChainCursor},
    event::{AuditEvent, AuditLog, LogEntry},
};

#[derive(Default)]
pub(crate) struct SessionChain {
    pub(crate) events: Vec<AuditEvent>,
    pub(crate) cursor: ChainCursor,
}

/// An in-memory, append-only execution log with per-session SHA-256 chains.
#[derive(Clone, Default)]
pub struct InMemoryExecutionLog {
    pub(crate) sessions: Arc<Mutex<HashMap<SessionId, SessionChain>>>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SleuthResult<MutexGuard<'_, HashMap<SessionId, SessionChain>>> {
        self.sessions.lock().map_err(|e| SleuthError::ExecutionLogFailed {
            reason: format!("execution log lock poisoned: {}", e),
        })
    }

    fn append(&self, session_id: &SessionId, entry: LogEntry) -> SleuthResult<AuditEvent> {
        let mut sessions = self.lock()?;
        let chain = sessions.entry(session_id.clone()).or_default();
        let event = chain.cursor.link(session_id, entry)?;
        chain.cursor.advance(&event);
        chain.events.push(event.clone());
        Ok(event)
    }

    /// Export a snapshot of one session's chain. `None` for an unknown
    /// session.
    pub fn export_log(&self, session_id: &SessionId) -> SleuthResult<Option<AuditLog>> {
        let sessions = self.lock()?;
        Ok(sessions.get(session_id).map(|chain| AuditLog {
            session_id: session_id.clone(),
            events: chain.events.clone(),
            exported_at: Utc::now(),
            terminal_hash: chain
                .events
                .last()
                .map(|e| e.this_hash.clone())
                .unwrap_or_default(),
        }))
    }

    /// The iteration records of one session, in write order.
    pub fn records(&self, session_id: &SessionId) -> SleuthResult<Vec<IterationRecord>> {
        let sessions = self.lock()?;
        Ok(sessions
            .get(session_id)
            .map(|chain| chain.events.iter().filter_map(|e| e.record().cloned()).collect())
            .unwrap_or_default())
    }

    /// True when every session's chain verifies.
    pub fn verify_integrity(&self) -> SleuthResult<bool> {
        let sessions = self.lock()?;
        Ok(sessions.values().all(|chain| verify_chain(&chain.events)))
    }

    pub fn session_count(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl ExecutionLog for InMemoryExecutionLog {
    fn record(&self, record: &IterationRecord) -> SleuthResult<()> {
        let event = self.append(
            &record.session_id,
            LogEntry::Iteration {
                record: record.clone(),
            },
        )?;
        debug!(
            session_id = %record.session_id,
            iteration = record.iteration,
            sequence = event.sequence,
            "iteration recorded"
        );
        Ok(())
    }

    /// Seals the session's chain; later writes for it fail.
    fn finalize(&self, session_id: &SessionId, terminal: &Terminal) -> SleuthResult<()> {
        let event = self.append(
            session_id,
            LogEntry::Finalized {
                terminal: terminal.clone(),
            },
        )?;
        info!(
            session_id = %session_id,
            event_count = event.sequence + 1,
            terminal = terminal.kind(),
            terminal_hash = %event.this_hash,
            "execution log finalized"
        );
        Ok(())
    }
}
