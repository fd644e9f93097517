//! # sleuth-audit
//!
//! Append-only, SHA-256 hash-chained execution logs for kubesleuth.
//!
//! ## Overview
//!
//! Every `IterationRecord` the loop writes is wrapped in an `AuditEvent`
//! linked to the previous event of the same session by its hash. `finalize`
//! appends a closing event carrying the session's `Terminal` and seals the
//! chain. Changing any byte of a stored event breaks the chain, which
//! `verify_chain` detects.
//!
//! Two sinks implement [`ExecutionLog`](sleuth_core::traits::ExecutionLog):
//!
//! - [`InMemoryExecutionLog`] keeps chains in memory, for tests and
//!   embedding.
//! - [`JsonlExecutionLog`] appends one JSON line per event to
//!   `react_execution_<session>.jsonl` in a log directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sleuth_audit::{read_log, verify_chain, JsonlExecutionLog};
//!
//! let log = JsonlExecutionLog::new("logs")?;
//! // hand `Box::new(log)` to AgentLoop::new(...)
//! let events = read_log(&path)?;
//! assert!(verify_chain(&events));
//! ```

pub mod chain;
pub mod event;
pub mod file;
pub mod memory;

pub use chain::{hash_event, verify_chain};
pub use event::{AuditEvent, AuditLog, LogEntry};
pub use file::{read_log, JsonlExecutionLog};
pub use memory::InMemoryExecutionLog;

// ── Tests ─────────────────────────────────────────────────────────────────────
