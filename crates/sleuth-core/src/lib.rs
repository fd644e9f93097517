//! # sleuth-core
//!
//! The investigation loop for kubesleuth.
//!
//! This crate provides:
//! - The seam traits (`CompletionService`, `Tool`, `ApprovalGate`, `ExecutionLog`)
//! - `ResponseInterpreter`, which turns model text into a `Decision`
//! - `ToolRegistry`, the only way tools are executed
//! - `PromptBuilder` and `LoopConfig`
//! - `AgentLoop`, which wires them together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sleuth_core::{AgentLoop, LoopConfig, ToolRegistry};
//! ```

pub mod agent_loop;
pub mod config;
pub mod interpreter;
pub mod prompt;
pub mod registry;
pub mod traits;

pub use agent_loop::AgentLoop;
pub use config::LoopConfig;
pub use interpreter::{Interpretation, ResponseInterpreter};
pub use prompt::{PromptBuilder, PromptTemplates};
pub use registry::ToolRegistry;
