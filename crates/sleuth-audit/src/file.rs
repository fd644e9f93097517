//! JSON-lines execution log on disk.
//!
//! One file per session, `react_execution_<session>.jsonl`, inside the log
//! directory. Each line is a serialized `AuditEvent`, so the file carries the
//! same hash chain as the in-memory log and can be verified offline with
//! `read_log` + `verify_chain`.
//!
//! Only open sessions keep a cursor in memory. A session whose file exists but
//! has no cursor is sealed: it was finalized, or written by another process.

use std::{
    collections::{hash_map::Entry, HashMap},
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, info};

use sleuth_contracts::{
    error::{SleuthError, SleuthResult},
    execution::{IterationRecord, Terminal},
    state::SessionId,
};
use sleuth_core::traits::ExecutionLog;

use crate::{
    chain::ChainCursor,
    event::{AuditEvent, LogEntry},
};

pub struct JsonlExecutionLog {
    dir: PathBuf,
    cursors: Mutex<HashMap<SessionId, ChainCursor>>,
}

impl JsonlExecutionLog {
    /// Use `dir` for log files, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> SleuthResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SleuthError::ExecutionLogFailed {
            reason: format!("failed to create log directory '{}': {}", dir.display(), e),
        })?;
        Ok(Self {
            dir,
            cursors: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sessions written to but not yet finalized.
    pub fn open_sessions(&self) -> usize {
        self.cursors.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("react_execution_{}.jsonl", session_id))
    }

    fn append(&self, session_id: &SessionId, entry: LogEntry) -> SleuthResult<AuditEvent> {
        let mut cursors = self.cursors.lock().map_err(|e| SleuthError::ExecutionLogFailed {
            reason: format!("execution log lock poisoned: {}", e),
        })?;
        let path = self.path_for(session_id);
        let cursor = match cursors.entry(session_id.clone()) {
            Entry::Occupied(open) => open.into_mut(),
            Entry::Vacant(_) if path.exists() => {
                return Err(SleuthError::ExecutionLogFailed {
                    reason: format!("session {} is sealed in '{}'", session_id, path.display()),
                });
            }
            Entry::Vacant(slot) => slot.insert(ChainCursor::default()),
        };
        let event = cursor.link(session_id, entry)?;

        let mut line = serde_json::to_string(&event).map_err(|e| SleuthError::ExecutionLogFailed {
            reason: format!("failed to serialize log entry: {}", e),
        })?;
        line.push('\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| SleuthError::ExecutionLogFailed {
                reason: format!("failed to append to '{}': {}", path.display(), e),
            })?;

        cursor.advance(&event);
        if cursor.finalized {
            cursors.remove(session_id);
        }
        Ok(event)
    }
}

impl ExecutionLog for JsonlExecutionLog {
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
            "iteration appended to log file"
        );
        Ok(())
    }

    fn finalize(&self, session_id: &SessionId, terminal: &Terminal) -> SleuthResult<()> {
        let event = self.append(
            session_id,
            LogEntry::Finalized {
                terminal: terminal.clone(),
            },
        )?;
        info!(
            session_id = %session_id,
            path = %self.path_for(session_id).display(),
            terminal = terminal.kind(),
            terminal_hash = %event.this_hash,
            "execution log file finalized"
        );
        Ok(())
    }
}

/// Read every event from a `.jsonl` log file. Blank lines are skipped.
pub fn read_log(path: &Path) -> SleuthResult<Vec<AuditEvent>> {
    let file = fs::File::open(path).map_err(|e| SleuthError::ExecutionLogFailed {
        reason: format!("failed to open '{}': {}", path.display(), e),
    })?;

    let mut events = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| SleuthError::ExecutionLogFailed {
            reason: format!("failed to read '{}': {}", path.display(), e),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|e| SleuthError::ExecutionLogFailed {
            reason: format!("{} line {}: {}", path.display(), n + 1, e),
        })?;
        events.push(event);
    }
    Ok(events)
}
