//! Line-oriented terminal approval port.
//!
//! Input lines are read on a dedicated thread and handed over through a
//! channel, so `ask` can wait with a deadline instead of blocking on the
//! reader. End of input is reported as `HumanResponse::InputClosed`.

use std::{
    io::{self, BufRead, BufReader, Write},
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError},
        Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::debug;

use sleuth_contracts::error::{SleuthError, SleuthResult};

use crate::port::{ApprovalPort, ApprovalRequest, HumanResponse, RiskLevel};

const RULE: &str = "----------------------------------------";
const QUESTION: &str = "Approve execution? [yes/no/details/abort]: ";

pub struct ConsoleApprovalPort<W: Write + Send> {
    lines: Mutex<Receiver<String>>,
    out: Mutex<W>,
}

impl ConsoleApprovalPort<io::Stdout> {
    /// Read answers from stdin and write prompts to stdout.
    pub fn stdio() -> SleuthResult<Self> {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<W: Write + Send> ConsoleApprovalPort<W> {
    pub fn new<R>(input: R, out: W) -> SleuthResult<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("sleuth-approval-input".to_string())
            .spawn(move || {
                for line in input.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                debug!("approval input reached end of stream");
            })
            .map_err(|e| SleuthError::ApprovalFailed {
                reason: format!("failed to start input reader: {e}"),
            })?;

        Ok(Self {
            lines: Mutex::new(rx),
            out: Mutex::new(out),
        })
    }

    fn emit(&self, text: &str) -> SleuthResult<()> {
        let mut out = self.out.lock().map_err(|_| SleuthError::ApprovalFailed {
            reason: "console output lock poisoned".to_string(),
        })?;
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| SleuthError::ApprovalFailed {
                reason: format!("failed to write approval prompt: {e}"),
            })
    }
}

impl<W: Write + Send> ApprovalPort for ConsoleApprovalPort<W> {
    fn present(&self, request: &ApprovalRequest) -> SleuthResult<()> {
        let title = match request.risk {
            RiskLevel::Dangerous => "DANGEROUS action for review",
            RiskLevel::Safe => "Safe action proposed",
            RiskLevel::Unclassified => "Proposed action for review",
        };
        let action = &request.action;
        let reasoning = if action.reasoning.is_empty() {
            "N/A"
        } else {
            action.reasoning.as_str()
        };
        let parameters = pretty(&action.parameters)?;
        self.emit(&format!(
            "\n{RULE}\n{title}\nTool: {}\nParameters: {parameters}\nReasoning: {reasoning}\n{RULE}\n",
            action.tool
        ))
    }

    fn ask(&self, timeout: Option<Duration>) -> SleuthResult<HumanResponse> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let lines = self.lines.lock().map_err(|_| SleuthError::ApprovalFailed {
            reason: "console input lock poisoned".to_string(),
        })?;

        loop {
            self.emit(QUESTION)?;
            let received = match deadline {
                Some(deadline) => {
                    lines.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => lines.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            let line = match received {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    self.emit("\n")?;
                    return Ok(HumanResponse::TimedOut);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.emit("\n")?;
                    return Ok(HumanResponse::InputClosed);
                }
            };

            match parse_answer(&line) {
                Some(response) => return Ok(response),
                None if line.trim().is_empty() => {}
                None => self.emit("Please answer yes, no, details or abort.\n")?,
            }
        }
    }

    fn show_details(&self, request: &ApprovalRequest) -> SleuthResult<()> {
        let payload = serde_json::to_string_pretty(&request.action).map_err(|e| {
            SleuthError::ApprovalFailed {
                reason: format!("failed to render action: {e}"),
            }
        })?;
        self.emit(&format!("Full action details:\n{payload}\n"))
    }
}

fn parse_answer(line: &str) -> Option<HumanResponse> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(HumanResponse::Approve),
        "n" | "no" => Some(HumanResponse::Reject),
        "d" | "details" => Some(HumanResponse::Details),
        "a" | "abort" => Some(HumanResponse::Abort),
        _ => None,
    }
}

fn pretty<T: serde::Serialize>(value: &T) -> SleuthResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| SleuthError::ApprovalFailed {
        reason: format!("failed to render parameters: {e}"),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
