//! The seam between tools and the cluster.
//!
//! Tools build kubectl argument lists and hand them to a `KubectlRunner`.
//! `ProcessKubectl` runs the real binary; `MockCluster` answers from a
//! fictional cluster.

use std::{
    io::{self, Read},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use sleuth_contracts::error::ToolError;

use crate::config::KubectlConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub trait KubectlRunner: Send + Sync {
    /// Run kubectl with `args` (no binary name, no `--context`) and return
    /// stdout. A non-zero exit is `ExecutionFailed`.
    ///
    /// `timeout` narrows the runner's own limit; it never widens it.
    fn run(&self, args: &[String], timeout: Option<Duration>) -> Result<String, ToolError>;
}

/// Runs the kubectl binary as a child process.
pub struct ProcessKubectl {
    config: KubectlConfig,
}

impl ProcessKubectl {
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }

    fn command_line(&self, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(context) = &self.config.context {
            full.push("--context".to_string());
            full.push(context.clone());
        }
        full.extend(args.iter().cloned());
        full
    }

    fn effective_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        match (self.config.timeout(), requested) {
            (Some(own), Some(req)) => Some(own.min(req)),
            (own, req) => own.or(req),
        }
    }
}

impl KubectlRunner for ProcessKubectl {
    fn run(&self, args: &[String], timeout: Option<Duration>) -> Result<String, ToolError> {
        let full = self.command_line(args);
        let command_line = format!("{} {}", self.config.path, full.join(" "));
        debug!(command = %command_line, "running kubectl");

        let mut child = Command::new(&self.config.path)
            .args(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    ToolError::Unavailable(format!("kubectl not found at '{}'", self.config.path))
                }
                _ => ToolError::ExecutionFailed(format!("failed to start '{command_line}': {e}")),
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.effective_timeout(timeout))
            .map_err(|e| ToolError::ExecutionFailed(format!("failed waiting for '{command_line}': {e}")))?;

        let Some(status) = status else {
            let limit = self.effective_timeout(timeout).unwrap_or_default();
            warn!(command = %command_line, timeout_secs = limit.as_secs_f64(), "kubectl timed out");
            return Err(ToolError::Timeout(limit));
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(ToolError::ExecutionFailed(format!(
                "kubectl command failed with exit code {code}: {detail}"
            )));
        }

        Ok(truncate_lines(stdout.trim(), self.config.max_output_lines))
    }
}

/// Read a pipe to the end on a helper thread so the child never blocks on a
/// full pipe buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// `Ok(None)` when the deadline passed; the child has been killed by then.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> io::Result<Option<std::process::ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Keep at most `max_lines` lines, noting how many were cut.
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    let total = text.lines().count();
    if max_lines == 0 || total <= max_lines {
        return text.to_string();
    }
    let kept: Vec<&str> = text.lines().take(max_lines).collect();
    format!(
        "{}\n... (truncated, {} more lines)",
        kept.join("\n"),
        total - max_lines
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(max_output_lines: usize, timeout_secs: u64) -> ProcessKubectl {
        ProcessKubectl::new(KubectlConfig {
            path: "sh".to_string(),
            timeout_secs,
            max_output_lines,
            ..KubectlConfig::default()
        })
    }

    fn script(s: &str) -> Vec<String> {
        vec!["-c".to_string(), s.to_string()]
    }

    #[test]
    fn truncation_counts_dropped_lines() {
        assert_eq!(truncate_lines("a\nb\nc\nd", 2), "a\nb\n... (truncated, 2 more lines)");
        assert_eq!(truncate_lines("a\nb", 2), "a\nb");
        assert_eq!(truncate_lines("a\nb", 0), "a\nb");
    }

    #[test]
    fn context_is_prepended() {
        let runner = ProcessKubectl::new(KubectlConfig {
            context: Some("kind-lab".to_string()),
            ..KubectlConfig::default()
        });
        assert_eq!(
            runner.command_line(&["get".to_string(), "pods".to_string()]),
            vec!["--context", "kind-lab", "get", "pods"]
        );
    }

    #[test]
    fn requested_timeout_only_narrows() {
        let runner = shell(10, 30);
        assert_eq!(runner.effective_timeout(Some(Duration::from_secs(5))), Some(Duration::from_secs(5)));
        assert_eq!(runner.effective_timeout(Some(Duration::from_secs(60))), Some(Duration::from_secs(30)));
        assert_eq!(shell(10, 0).effective_timeout(None), None);
    }

    #[cfg(unix)]
    #[test]
    fn stdout_is_returned_and_truncated() {
        let out = shell(3, 10).run(&script("seq 1 5"), None).unwrap();
        assert_eq!(out, "1\n2\n3\n... (truncated, 2 more lines)");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_stderr() {
        let err = shell(10, 10).run(&script("echo boom >&2; exit 3"), None).unwrap_err();
        assert_eq!(
            err,
            ToolError::ExecutionFailed("kubectl command failed with exit code 3: boom".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let started = Instant::now();
        let err = shell(10, 30)
            .run(&script("sleep 5"), Some(Duration::from_millis(100)))
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout(Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let runner = ProcessKubectl::new(KubectlConfig {
            path: "/nonexistent/kubectl".to_string(),
            ..KubectlConfig::default()
        });
        let err = runner.run(&["version".to_string()], None).unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)), "{err:?}");
    }
}
