//! The investigation loop: the ReAct state machine.
//!
//! Each iteration runs:
//!
//!   Prompt → Complete → Interpret → [Approve → Execute] → Record
//!
//! The loop ends in exactly one `Terminal`. Recoverable problems (completion
//! failure, malformed output, failed tool) are fed back into the next prompt
//! as feedback; they never cause a blind retry. Anything else ends the run.
//!
//! The ordering invariant: `ToolRegistry::execute` is never reached for an
//! action unless `ApprovalGate::authorize` returned `Approved` for it.

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use sleuth_contracts::{
    approval::ApprovalOutcome,
    decision::{Action, Decision},
    error::{CompletionError, SleuthError, SleuthResult},
    execution::{InvestigationReport, IterationOutcome, IterationRecord, RenderedPrompt, Terminal},
    state::{AgentState, Interaction, SessionId},
    tool::{ToolContext, ToolDescription, ToolResult},
};

use crate::{
    config::LoopConfig,
    interpreter::ResponseInterpreter,
    prompt::PromptBuilder,
    registry::{panic_message, ToolRegistry},
    traits::{ApprovalGate, CompletionService, ExecutionLog},
};

const MALFORMED_FEEDBACK: &str = "Your response did not contain the required JSON block. \
Please provide the action or final answer in the specified JSON format.";

/// What one iteration decided.
enum Step {
    /// Stay in RUNNING, carrying this feedback into the next prompt.
    Continue(Option<String>),
    Finish(Terminal),
}

/// Immutable inputs of one run.
struct RunInput<'a> {
    question: &'a str,
    context: &'a Map<String, Value>,
    /// Rendered once per run; registrations do not change mid-run.
    tools: BTreeMap<String, ToolDescription>,
}

/// Drives investigations against one set of collaborators.
///
/// An `AgentLoop` holds no per-run state. Each call to `run` creates and
/// exclusively owns a fresh `AgentState`, so one loop may serve sequential
/// investigations and several loops may share a registry.
pub struct AgentLoop {
    completion: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    approval: Box<dyn ApprovalGate>,
    log: Box<dyn ExecutionLog>,
    interpreter: ResponseInterpreter,
    prompts: PromptBuilder,
    config: LoopConfig,
    /// Completion workers still running after their deadline passed.
    abandoned: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentLoop {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        registry: Arc<ToolRegistry>,
        approval: Box<dyn ApprovalGate>,
        log: Box<dyn ExecutionLog>,
        config: LoopConfig,
    ) -> Self {
        Self {
            completion,
            registry,
            approval,
            log,
            interpreter: ResponseInterpreter::new(),
            prompts: PromptBuilder::new(),
            config,
            abandoned: Mutex::new(Vec::new()),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Completion calls that outlived their deadline and are still running.
    /// A thread cannot be cancelled; each one ends when the service returns
    /// or its own request timeout fires.
    pub fn abandoned_workers(&self) -> usize {
        match self.abandoned.lock() {
            Ok(mut workers) => {
                workers.retain(|worker| !worker.is_finished());
                workers.len()
            }
            Err(_) => 0,
        }
    }

    /// Investigate `question` in a new session.
    pub fn run(&self, question: &str, context: &Map<String, Value>) -> InvestigationReport {
        self.run_session(SessionId::new(), question, context, None)
    }

    /// Investigate with caller feedback appended to the first prompt.
    pub fn run_with_feedback(
        &self,
        question: &str,
        context: &Map<String, Value>,
        initial_feedback: Option<&str>,
    ) -> InvestigationReport {
        self.run_session(SessionId::new(), question, context, initial_feedback)
    }

    /// Run a full investigation under a caller-chosen session id.
    ///
    /// Never panics and never returns an error: every ending, abnormal ones
    /// included, is reported as a `Terminal` inside the report.
    pub fn run_session(
        &self,
        session_id: SessionId,
        question: &str,
        context: &Map<String, Value>,
        initial_feedback: Option<&str>,
    ) -> InvestigationReport {
        let max_iterations = self.config.max_iterations();
        let mut state = AgentState::new(session_id, max_iterations);
        let input = RunInput {
            question,
            context,
            tools: self.registry.describe(),
        };

        info!(
            session_id = %state.session_id,
            max_iterations,
            tools = input.tools.len(),
            completion = self.completion.name(),
            "investigation starting"
        );

        let mut feedback = initial_feedback.map(str::to_string);
        let terminal = loop {
            if state.has_reached_max_iterations() {
                warn!(
                    session_id = %state.session_id,
                    max_iterations,
                    "iteration budget exhausted without a final answer"
                );
                break Terminal::MaxIterations {
                    message: format!(
                        "Max iterations reached ({max_iterations}) without a final answer."
                    ),
                };
            }

            state.advance();
            debug!(
                session_id = %state.session_id,
                iteration = state.iteration(),
                max_iterations,
                "iteration starting"
            );

            match self.iterate(&mut state, &input, feedback.take()) {
                Ok(Step::Continue(next)) => feedback = next,
                Ok(Step::Finish(terminal)) => break terminal,
                Err(e) => {
                    error!(
                        session_id = %state.session_id,
                        iteration = state.iteration(),
                        error = %e,
                        "investigation failed"
                    );
                    break Terminal::FatalError {
                        message: e.to_string(),
                    };
                }
            }
        };

        if let Err(e) = self.log.finalize(&state.session_id, &terminal) {
            error!(session_id = %state.session_id, error = %e, "execution log finalize failed");
        }

        info!(
            session_id = %state.session_id,
            iterations = state.iteration(),
            terminal = terminal.kind(),
            "investigation finished"
        );

        InvestigationReport {
            session_id: state.session_id.clone(),
            terminal,
            iterations: state.iteration(),
            duration_secs: state.elapsed_secs(),
            history: state.into_history(),
        }
    }

    // ── One iteration ────────────────────────────────────────────────────────

    fn iterate(
        &self,
        state: &mut AgentState,
        input: &RunInput<'_>,
        feedback: Option<String>,
    ) -> SleuthResult<Step> {
        // ── Step 1: Render the prompt ────────────────────────────────────────
        let prompt = match self.render_prompt(state, input, feedback.as_deref()) {
            Ok(prompt) => prompt,
            Err(e) => return Err(self.record_fatal(state, None, None, None, e)),
        };

        // ── Step 2: Call the completion service ──────────────────────────────
        let raw = match self.complete(&prompt) {
            Ok(raw) => raw,
            Err(e) if e.is_recoverable() => {
                warn!(
                    session_id = %state.session_id,
                    iteration = state.iteration(),
                    error = %e,
                    "completion failed, retrying with feedback"
                );
                self.record(
                    state,
                    Some(prompt),
                    None,
                    None,
                    IterationOutcome::CompletionFailed {
                        error: e.to_string(),
                    },
                )?;
                return Ok(Step::Continue(Some(format!(
                    "The LLM analysis failed: {e}. Please try again or adjust the approach."
                ))));
            }
            Err(e) => return Err(self.record_fatal(state, Some(prompt), None, None, e.into())),
        };

        // ── Step 3: Interpret the response ───────────────────────────────────
        let interpretation = match self.interpreter.interpret(&raw) {
            Ok(interpretation) => interpretation,
            Err(SleuthError::MalformedResponse { reason, .. }) => {
                warn!(
                    session_id = %state.session_id,
                    iteration = state.iteration(),
                    reason = %reason,
                    "model response malformed"
                );
                state.push(Interaction::model(raw.clone()));
                self.record(
                    state,
                    Some(prompt),
                    Some(raw),
                    None,
                    IterationOutcome::Malformed {
                        error: reason.clone(),
                    },
                )?;
                return Ok(Step::Continue(Some(format!(
                    "{MALFORMED_FEEDBACK} Problem: {reason}."
                ))));
            }
            Err(e) => return Err(self.record_fatal(state, Some(prompt), Some(raw), None, e)),
        };

        let model_text = interpretation.reasoning.clone().unwrap_or_else(|| raw.clone());
        state.push(Interaction::model(model_text));
        let decision = interpretation.decision;

        // ── Step 4: Final answer ends the run ────────────────────────────────
        let action = match decision {
            Decision::FinalAnswer(answer) => {
                info!(
                    session_id = %state.session_id,
                    iteration = state.iteration(),
                    confidence = answer.confidence,
                    "final answer produced"
                );
                self.record(
                    state,
                    Some(prompt),
                    Some(raw),
                    Some(Decision::FinalAnswer(answer.clone())),
                    IterationOutcome::Answered,
                )?;
                return Ok(Step::Finish(Terminal::FinalAnswer(answer)));
            }
            Decision::Action(action) => action,
        };

        // ── Step 5a: Approval ────────────────────────────────────────────────
        let decision = Some(Decision::Action(action.clone()));
        let outcome = match self.approval.authorize(&action) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.record_fatal(state, Some(prompt), Some(raw), decision, e)),
        };

        if !outcome.is_approved() {
            let reason = outcome.reason().unwrap_or("action not approved").to_string();
            info!(
                session_id = %state.session_id,
                iteration = state.iteration(),
                tool = %action.tool,
                reason = %reason,
                "action not approved, aborting investigation"
            );
            self.record(
                state,
                Some(prompt),
                Some(raw),
                decision,
                IterationOutcome::ApprovalDenied { outcome },
            )?;
            return Ok(Step::Finish(Terminal::Aborted { reason }));
        }

        // ── Steps 5b-5d: Execute, record, set feedback ───────────────────────
        let result = self.execute(state, &action);
        let next_feedback = if result.is_success() {
            None
        } else {
            let err = result.error().unwrap_or("unknown error");
            warn!(
                session_id = %state.session_id,
                iteration = state.iteration(),
                tool = %action.tool,
                error = %err,
                "tool reported failure"
            );
            Some(format!(
                "The tool '{}' reported an error: {err}. Please analyze and proceed.",
                action.tool
            ))
        };

        state.push(Interaction::tool(action, result.clone()));
        self.record(
            state,
            Some(prompt),
            Some(raw),
            decision,
            IterationOutcome::ToolExecuted { result },
        )?;
        Ok(Step::Continue(next_feedback))
    }

    fn render_prompt(
        &self,
        state: &AgentState,
        input: &RunInput<'_>,
        feedback: Option<&str>,
    ) -> SleuthResult<RenderedPrompt> {
        let prompt = self
            .prompts
            .render(&input.tools, input.question, input.context, state, feedback)?;
        if prompt.system.trim().is_empty() || prompt.user.trim().is_empty() {
            return Err(SleuthError::PromptError {
                reason: "rendered prompt is empty".to_string(),
            });
        }
        Ok(prompt)
    }

    /// Call the completion service, bounded by `completion_timeout` if set.
    fn complete(&self, prompt: &RenderedPrompt) -> Result<String, CompletionError> {
        let Some(timeout) = self.config.completion_timeout else {
            return panic::catch_unwind(AssertUnwindSafe(|| {
                self.completion.complete(&prompt.system, &prompt.user)
            }))
            .unwrap_or_else(|payload| {
                Err(CompletionError::Fatal(format!(
                    "completion service panicked: {}",
                    panic_message(&*payload)
                )))
            });
        };

        let (tx, rx) = mpsc::channel();
        let service = Arc::clone(&self.completion);
        let (system, user) = (prompt.system.clone(), prompt.user.clone());
        let worker = thread::Builder::new()
            .name("sleuth-completion".to_string())
            .spawn(move || {
                // The receiver may be gone after a timeout; the result is dropped.
                let _ = tx.send(service.complete(&system, &user));
            })
            .map_err(|e| CompletionError::Unavailable(format!("cannot start completion worker: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let still_running = match self.abandoned.lock() {
                    Ok(mut workers) => {
                        workers.retain(|w| !w.is_finished());
                        workers.push(worker);
                        workers.len()
                    }
                    Err(_) => 0,
                };
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    still_running, "completion call abandoned after deadline"
                );
                Err(CompletionError::Timeout(timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CompletionError::Fatal(
                "completion worker exited without a response".to_string(),
            )),
        }
    }

    /// Run an approved action through the registry. Never fails: every
    /// failure, including an unknown tool, comes back as a failed result.
    fn execute(&self, state: &AgentState, action: &Action) -> ToolResult {
        let context = ToolContext::new(state.session_id.clone(), action.parameters.clone())
            .with_dry_run(self.config.dry_run)
            .with_timeout(self.config.tool_timeout)
            .with_metadata("iteration", Value::from(state.iteration()));

        debug!(
            session_id = %state.session_id,
            iteration = state.iteration(),
            tool = %action.tool,
            "executing approved action"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.registry.execute(&action.tool, &context)
        }));
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult::failure(e.to_string(), 0.0)
                .with_metadata("tool", Value::String(action.tool.clone())),
            Err(payload) => ToolResult::failure(
                format!("tool execution panicked: {}", panic_message(&*payload)),
                0.0,
            )
            .with_metadata("tool", Value::String(action.tool.clone())),
        }
    }

    // ── Execution log ────────────────────────────────────────────────────────

    fn record(
        &self,
        state: &AgentState,
        prompt: Option<RenderedPrompt>,
        raw_output: Option<String>,
        decision: Option<Decision>,
        outcome: IterationOutcome,
    ) -> SleuthResult<()> {
        self.log.record(&IterationRecord {
            session_id: state.session_id.clone(),
            iteration: state.iteration(),
            prompt,
            raw_output,
            decision,
            outcome,
            timestamp: Utc::now(),
        })
    }

    /// Record a fatal iteration on a best-effort basis and hand back the
    /// error that ended it.
    fn record_fatal(
        &self,
        state: &AgentState,
        prompt: Option<RenderedPrompt>,
        raw_output: Option<String>,
        decision: Option<Decision>,
        err: SleuthError,
    ) -> SleuthError {
        let outcome = IterationOutcome::Fatal {
            message: err.to_string(),
        };
        if let Err(log_err) = self.record(state, prompt, raw_output, decision, outcome) {
            warn!(
                session_id = %state.session_id,
                error = %log_err,
                "could not record fatal iteration"
            );
        }
        err
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
