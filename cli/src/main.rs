//! kubesleuth command line.
//!
//! Runs one investigation: the model proposes kubectl-backed diagnostic
//! actions, a human (or the approval policy) reviews each one, and every
//! iteration is written to the execution log.
//!
//! Usage:
//!   sleuth investigate "why is the api pod restarting?"
//!   sleuth investigate --mock-cluster --replay demos/crashloop.json --auto-approve "why is the api down?"
//!   sleuth tools --mock-cluster
//!   sleuth check-config --config sleuth.toml

mod config;
mod replay;
mod report;

use std::{path::PathBuf, process, sync::Arc};

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sleuth_approval::{ConsoleApprovalPort, PolicyApprovalGate};
use sleuth_audit::{InMemoryExecutionLog, JsonlExecutionLog};
use sleuth_contracts::{
    error::{SleuthError, SleuthResult},
    state::SessionId,
};
use sleuth_core::{
    traits::{CompletionService, ExecutionLog},
    AgentLoop, PromptBuilder, ToolRegistry,
};
use sleuth_kube::{register_default_tools, KubectlRunner, MockCluster, ProcessKubectl};

use config::SleuthConfig;
use replay::ReplayCompletion;

// ── CLI definition ────────────────────────────────────────────────────────────

/// kubesleuth: a reviewed ReAct loop for Kubernetes investigations.
#[derive(Parser)]
#[command(
    name = "sleuth",
    about = "Investigate a Kubernetes cluster with a human-reviewed agent loop",
    long_about = "Asks a language model to investigate a question about a Kubernetes cluster.\n\
                  Every proposed action is reviewed before it runs and every iteration is\n\
                  recorded in a hash-chained execution log."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Investigate a question about the cluster.
    Investigate(InvestigateArgs),
    /// List the registered tools and their parameters.
    Tools(CommonArgs),
    /// Load the configuration, apply overrides and print the result.
    CheckConfig(CommonArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Answer kubectl commands from a built-in fictional cluster.
    #[arg(long)]
    mock_cluster: bool,
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InvestigateArgs {
    /// The question to investigate.
    question: String,
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    max_iterations: Option<u32>,
    /// Approve every action without asking.
    #[arg(long)]
    auto_approve: bool,
    /// Disable human review; unlisted actions are approved.
    #[arg(long)]
    no_hitl: bool,
    /// Approve actions on the safe list without asking.
    #[arg(long)]
    auto_approve_safe: bool,
    /// Mutating tools only simulate.
    #[arg(long)]
    dry_run: bool,
    /// Namespace tools use when the model names none.
    #[arg(long, short)]
    namespace: Option<String>,
    /// Write `react_execution_<session>.jsonl` files to this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Replay model responses from a JSON array instead of calling a provider.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Extra guidance appended to the first prompt.
    #[arg(long)]
    feedback: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Investigate(args) => investigate(args),
        Command::Tools(args) => list_tools(args),
        Command::CheckConfig(args) => check_config(args),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("sleuth error: {}", e);
            process::exit(2);
        }
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

/// File, then environment.
fn load_config(path: Option<&PathBuf>) -> SleuthResult<SleuthConfig> {
    let mut config = match path {
        Some(path) => SleuthConfig::from_file(path)?,
        None => SleuthConfig::default(),
    };
    config.apply_env(|k| std::env::var(k).ok())?;
    Ok(config)
}

fn build_registry(config: &SleuthConfig, mock_cluster: bool) -> SleuthResult<ToolRegistry> {
    let runner: Arc<dyn KubectlRunner> = if mock_cluster {
        info!("using the mock cluster");
        Arc::new(MockCluster::new())
    } else {
        Arc::new(ProcessKubectl::new(config.kubectl.clone()))
    };
    let mut registry = ToolRegistry::new();
    register_default_tools(&mut registry, runner, config.kubectl.clone())?;
    Ok(registry)
}

fn build_completion(config: &SleuthConfig, replay: Option<&PathBuf>) -> SleuthResult<Arc<dyn CompletionService>> {
    match replay {
        Some(path) => {
            let replay = ReplayCompletion::from_file(path)?;
            if replay.is_empty() {
                return Err(SleuthError::ConfigError {
                    reason: format!("replay file '{}' holds no responses", path.display()),
                });
            }
            info!(responses = replay.len(), "replaying recorded responses");
            Ok(Arc::new(replay))
        }
        None => sleuth_llm::build_completion_service(&config.llm, |k| std::env::var(k).ok()),
    }
}

// ── investigate ───────────────────────────────────────────────────────────────

fn investigate(args: InvestigateArgs) -> SleuthResult<i32> {
    let mut config = load_config(args.common.config.as_ref())?;

    // Flags override file and environment.
    if let Some(n) = args.max_iterations {
        config.agent.max_iterations = n;
    }
    if args.auto_approve {
        config.approval.auto_approve_all = true;
    }
    if args.no_hitl {
        config.approval.hitl_enabled = false;
    }
    if args.auto_approve_safe {
        config.approval.auto_approve_safe = true;
    }
    if args.dry_run {
        config.agent.dry_run = true;
    }
    if let Some(namespace) = args.namespace {
        config.kubectl.namespace = namespace;
    }
    if let Some(dir) = args.log_dir {
        config.agent.log_dir = Some(dir);
    }

    let loop_config = config.loop_config()?;
    let registry = build_registry(&config, args.common.mock_cluster)?;
    let completion = build_completion(&config, args.replay.as_ref())?;

    let mut gate = PolicyApprovalGate::new(
        config.approval.clone(),
        Box::new(ConsoleApprovalPort::stdio()?),
    );
    gate.mark_dangerous(registry.dangerous_tools());

    let session_id = SessionId::new();
    let (log, log_path): (Box<dyn ExecutionLog>, Option<PathBuf>) = match &config.agent.log_dir {
        Some(dir) => {
            let log = JsonlExecutionLog::new(dir.clone())?;
            let path = log.path_for(&session_id);
            (Box::new(log) as Box<dyn ExecutionLog>, Some(path))
        }
        None => (Box::new(InMemoryExecutionLog::new()) as Box<dyn ExecutionLog>, None),
    };

    let mut agent = AgentLoop::new(completion, Arc::new(registry), Box::new(gate), log, loop_config);
    if let Some(templates) = config.prompts.clone() {
        agent = agent.with_prompts(PromptBuilder::with_templates(templates));
    }

    let mut context = Map::new();
    context.insert("namespace".to_string(), json!(config.kubectl.namespace));
    context.insert("allowed_namespaces".to_string(), json!(config.kubectl.allowed_namespaces));
    if let Some(kube_context) = &config.kubectl.context {
        context.insert("kubectl_context".to_string(), json!(kube_context));
    }
    context.insert("dry_run".to_string(), json!(config.agent.dry_run));

    info!(session_id = %session_id, question = %args.question, "starting investigation");
    let outcome = agent.run_session(session_id, &args.question, &context, args.feedback.as_deref());

    if args.common.json {
        let text = serde_json::to_string_pretty(&outcome).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to serialize report: {e}"),
        })?;
        println!("{text}");
    } else {
        print!("{}", report::render(&outcome));
        if let Some(path) = log_path {
            println!("Execution log: {}", path.display());
        }
    }

    Ok(if outcome.terminal.is_success() { 0 } else { 1 })
}

// ── tools ─────────────────────────────────────────────────────────────────────

fn list_tools(args: CommonArgs) -> SleuthResult<i32> {
    let config = load_config(args.config.as_ref())?;
    let registry = build_registry(&config, args.mock_cluster)?;
    let described = registry.describe();

    if args.json {
        let text = serde_json::to_string_pretty(&described).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to serialize tool descriptions: {e}"),
        })?;
        println!("{text}");
        return Ok(0);
    }

    for (name, tool) in &described {
        let marker = if tool.dangerous { "  [dangerous]" } else { "" };
        println!("{name}{marker}");
        println!("    {}", tool.description);
        let properties = tool
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .filter(|p| !p.is_empty());
        if let Some(properties) = properties {
            let names: Vec<&str> = properties.keys().map(String::as_str).collect();
            println!("    parameters: {}", names.join(", "));
        }
    }
    Ok(0)
}

// ── check-config ──────────────────────────────────────────────────────────────

fn check_config(args: CommonArgs) -> SleuthResult<i32> {
    let config = load_config(args.config.as_ref())?;
    config.loop_config()?;
    let registry = build_registry(&config, args.mock_cluster)?;

    if args.json {
        let text = serde_json::to_string_pretty(&config).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to serialize config: {e}"),
        })?;
        println!("{text}");
    } else {
        let text = toml::to_string_pretty(&config).map_err(|e| SleuthError::ConfigError {
            reason: format!("failed to serialize config: {e}"),
        })?;
        println!("{text}");
    }

    let key_var = config.llm.provider.api_key_var();
    let key_state = if std::env::var(key_var).is_ok_and(|k| !k.trim().is_empty()) {
        "set"
    } else {
        "NOT set"
    };
    eprintln!("{} tools registered; {key_var} is {key_state}", registry.len());
    Ok(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use sleuth_approval::ApprovalConfig;
    use sleuth_contracts::execution::Terminal;

    use super::*;

    const CRASHLOOP: &str = include_str!("../../demos/crashloop.json");

    fn gate(approval: ApprovalConfig, answers: &str) -> Box<PolicyApprovalGate> {
        let port = ConsoleApprovalPort::new(Cursor::new(answers.as_bytes().to_vec()), Vec::new()).unwrap();
        Box::new(PolicyApprovalGate::new(approval, Box::new(port)))
    }

    #[test]
    fn replayed_crashloop_demo_reaches_a_final_answer() {
        let config = SleuthConfig::default();
        let registry = build_registry(&config, true).unwrap();
        let completion = Arc::new(ReplayCompletion::from_json_str(CRASHLOOP).unwrap());
        let approval = ApprovalConfig {
            auto_approve_all: true,
            ..ApprovalConfig::default()
        };
        let log = InMemoryExecutionLog::new();

        let agent = AgentLoop::new(
            completion,
            Arc::new(registry),
            gate(approval, ""),
            Box::new(log.clone()),
            config.loop_config().unwrap(),
        );
        let outcome = agent.run("why is the api down?", &Map::new());

        match &outcome.terminal {
            Terminal::FinalAnswer(answer) => assert!(answer.main_response.contains("db-0")),
            other => panic!("expected a final answer, got {other:?}"),
        }
        assert_eq!(outcome.iterations, 5);
        let results: Vec<_> = outcome.history.iter().filter_map(|e| e.tool_result()).collect();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.is_success()));
        assert!(log.verify_integrity().unwrap());
        assert_eq!(log.session_count(), 1);
    }

    #[test]
    fn rejected_delete_never_reaches_the_cluster() {
        let config = SleuthConfig::default();
        let cluster = MockCluster::new();
        let mut registry = ToolRegistry::new();
        register_default_tools(&mut registry, Arc::new(cluster.clone()), config.kubectl.clone()).unwrap();

        let completion = Arc::new(ReplayCompletion::new(vec![
            r#"{"type": "action", "action": {"tool": "delete_pod", "parameters": {"pod_name": "db-0"}}}"#
                .to_string(),
        ]));
        let mut approval = ApprovalConfig {
            auto_approve_safe: true,
            ..ApprovalConfig::default()
        };
        approval.safe_tools.insert("delete_pod".to_string());
        let mut gate = gate(approval, "no\n");
        gate.mark_dangerous(registry.dangerous_tools());

        let agent = AgentLoop::new(
            completion,
            Arc::new(registry),
            gate,
            Box::new(InMemoryExecutionLog::new()),
            config.loop_config().unwrap(),
        );
        let outcome = agent.run("clean up db-0", &Map::new());

        assert_eq!(
            outcome.terminal,
            Terminal::Aborted {
                reason: "User rejected action: delete_pod".to_string()
            }
        );
        assert!(cluster.calls().is_empty());
        assert!(cluster.pod_names().contains(&"db-0".to_string()));
    }
}
