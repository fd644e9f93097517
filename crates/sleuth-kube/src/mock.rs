//! A fictional cluster answering kubectl commands from memory.
//!
//! The cluster tells one small story: `api` crash-loops because it cannot
//! reach its database, and `db-0` is stuck Pending because `node-2` is under
//! memory pressure. Every command is recorded for inspection, and deleted
//! pods stay deleted for the lifetime of the value.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::debug;

use sleuth_contracts::error::ToolError;

use crate::runner::KubectlRunner;

#[derive(Debug, Clone)]
struct MockPod {
    namespace: &'static str,
    name: &'static str,
    app: &'static str,
    phase: &'static str,
    ready: bool,
    restarts: u32,
    waiting_reason: Option<&'static str>,
    node: Option<&'static str>,
    logs: &'static [&'static str],
    previous_logs: &'static [&'static str],
}

#[derive(Debug, Clone)]
struct MockNode {
    name: &'static str,
    ready: bool,
    memory_pressure: bool,
}

#[derive(Debug, Clone)]
struct MockEvent {
    namespace: &'static str,
    kind: &'static str,
    reason: &'static str,
    object: (&'static str, &'static str),
    message: &'static str,
    count: u32,
    last_seen: &'static str,
}

const API_LOGS: &[&str] = &[
    "2025-01-15T10:03:58Z INFO  starting api server v2.3.1",
    "2025-01-15T10:03:58Z INFO  connecting to postgres at db-0.db.default.svc:5432",
    "2025-01-15T10:04:03Z ERROR could not connect to database: connection refused",
    "2025-01-15T10:04:03Z FATAL giving up after 5 attempts",
];

const WEB_LOGS: &[&str] = &[
    "2025-01-15T09:00:00Z INFO  listening on :8080",
    "2025-01-15T10:04:10Z WARN  upstream api returned 503 for GET /orders",
];

fn seed_pods() -> Vec<MockPod> {
    vec![
        MockPod {
            namespace: "default",
            name: "web-7d9f8c6b5-abcde",
            app: "web",
            phase: "Running",
            ready: true,
            restarts: 0,
            waiting_reason: None,
            node: Some("node-1"),
            logs: WEB_LOGS,
            previous_logs: &[],
        },
        MockPod {
            namespace: "default",
            name: "api-5c8b9d7f6-x2k4q",
            app: "api",
            phase: "Running",
            ready: false,
            restarts: 12,
            waiting_reason: Some("CrashLoopBackOff"),
            node: Some("node-1"),
            logs: API_LOGS,
            previous_logs: API_LOGS,
        },
        MockPod {
            namespace: "default",
            name: "db-0",
            app: "db",
            phase: "Pending",
            ready: false,
            restarts: 0,
            waiting_reason: None,
            node: None,
            logs: &[],
            previous_logs: &[],
        },
        MockPod {
            namespace: "kube-system",
            name: "coredns-6f6b679f8f-k8s2m",
            app: "kube-dns",
            phase: "Running",
            ready: true,
            restarts: 0,
            waiting_reason: None,
            node: Some("node-1"),
            logs: &["[INFO] plugin/reload: Running configuration SHA512 = 1a2b3c"],
            previous_logs: &[],
        },
    ]
}

fn seed_nodes() -> Vec<MockNode> {
    vec![
        MockNode {
            name: "node-1",
            ready: true,
            memory_pressure: false,
        },
        MockNode {
            name: "node-2",
            ready: false,
            memory_pressure: true,
        },
    ]
}

fn seed_events() -> Vec<MockEvent> {
    vec![
        MockEvent {
            namespace: "default",
            kind: "Normal",
            reason: "Pulled",
            object: ("Pod", "web-7d9f8c6b5-abcde"),
            message: "Container image \"shop/web:1.8.0\" already present on machine",
            count: 1,
            last_seen: "2025-01-15T09:00:00Z",
        },
        MockEvent {
            namespace: "default",
            kind: "Warning",
            reason: "NodeNotReady",
            object: ("Node", "node-2"),
            message: "Node node-2 status is now: NodeHasInsufficientMemory",
            count: 1,
            last_seen: "2025-01-15T09:58:12Z",
        },
        MockEvent {
            namespace: "default",
            kind: "Warning",
            reason: "FailedScheduling",
            object: ("Pod", "db-0"),
            message: "0/2 nodes are available: 1 Insufficient memory, 1 node(s) had untolerated taint {node.kubernetes.io/memory-pressure: }",
            count: 9,
            last_seen: "2025-01-15T10:02:30Z",
        },
        MockEvent {
            namespace: "default",
            kind: "Warning",
            reason: "BackOff",
            object: ("Pod", "api-5c8b9d7f6-x2k4q"),
            message: "Back-off restarting failed container api in pod api-5c8b9d7f6-x2k4q",
            count: 47,
            last_seen: "2025-01-15T10:04:05Z",
        },
    ]
}

/// Arguments split into flags and positionals, the way kubectl reads them.
#[derive(Debug, Default)]
struct Parsed<'a> {
    positionals: Vec<&'a str>,
    namespace: Option<&'a str>,
    output: Option<&'a str>,
    all_namespaces: bool,
    tail: Option<usize>,
    previous: bool,
    dry_run: bool,
}

fn parse(args: &[String]) -> Parsed<'_> {
    let mut parsed = Parsed::default();
    let mut iter = args.iter().map(String::as_str);
    while let Some(arg) = iter.next() {
        match arg {
            "-n" | "--namespace" => parsed.namespace = iter.next(),
            "-o" | "--output" => parsed.output = iter.next(),
            "-c" | "--container" | "-l" | "--selector" | "--context" => {
                iter.next();
            }
            "-A" | "--all-namespaces" => parsed.all_namespaces = true,
            "--previous" | "-p" => parsed.previous = true,
            "--tail" => parsed.tail = iter.next().and_then(|v| v.parse().ok()),
            _ if arg.starts_with("--namespace=") => {
                parsed.namespace = arg.strip_prefix("--namespace=");
            }
            _ if arg.starts_with("--tail=") => {
                parsed.tail = arg.strip_prefix("--tail=").and_then(|v| v.parse().ok());
            }
            _ if arg.starts_with("-o=") || arg.starts_with("--output=") => {
                parsed.output = arg.split_once('=').map(|(_, v)| v);
            }
            _ if arg.starts_with("--dry-run") => parsed.dry_run = true,
            _ if arg.starts_with('-') => {}
            _ => parsed.positionals.push(arg),
        }
    }
    parsed
}

fn not_found(kind: &str, name: &str) -> ToolError {
    ToolError::ExecutionFailed(format!(
        "kubectl command failed with exit code 1: Error from server (NotFound): {kind} \"{name}\" not found"
    ))
}

fn unsupported(args: &[String]) -> ToolError {
    ToolError::ExecutionFailed(format!(
        "kubectl command failed with exit code 1: mock cluster does not support '{}'",
        args.join(" ")
    ))
}

#[derive(Debug)]
struct ClusterState {
    pods: Vec<MockPod>,
    nodes: Vec<MockNode>,
    events: Vec<MockEvent>,
    calls: Vec<Vec<String>>,
}

/// A deterministic in-memory cluster. Clones share state.
#[derive(Debug, Clone)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                pods: seed_pods(),
                nodes: seed_nodes(),
                events: seed_events(),
                calls: Vec::new(),
            })),
        }
    }

    /// Every argument list received so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.pods.iter().map(|p| p.name.to_string()).collect())
            .unwrap_or_default()
    }

    fn answer(state: &mut ClusterState, args: &[String]) -> Result<String, ToolError> {
        let parsed = parse(args);
        let namespace = parsed.namespace.unwrap_or("default");
        let json_out = parsed.output == Some("json");

        match parsed.positionals.as_slice() {
            ["get", kind, rest @ ..] => {
                let name = rest.first().copied();
                match normalize(kind) {
                    "pods" => get_pods(state, &parsed, namespace, name, json_out),
                    "nodes" => get_nodes(state, name, json_out),
                    "events" => get_events(state, &parsed, namespace, json_out),
                    _ => Err(unsupported(args)),
                }
            }
            ["describe", kind, name] if normalize(kind) == "pods" => {
                describe_pod(state, namespace, name)
            }
            ["logs", name] => logs(state, &parsed, namespace, name),
            ["delete", kind, name] if normalize(kind) == "pods" => {
                delete_pod(state, &parsed, namespace, name)
            }
            ["version", ..] => Ok("Client Version: v1.29.0 (mock)".to_string()),
            _ => Err(unsupported(args)),
        }
    }
}

impl KubectlRunner for MockCluster {
    fn run(&self, args: &[String], _timeout: Option<std::time::Duration>) -> Result<String, ToolError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ToolError::Unavailable("mock cluster state poisoned".to_string()))?;
        state.calls.push(args.to_vec());
        debug!(args = %args.join(" "), "mock cluster command");
        Self::answer(&mut state, args)
    }
}

fn normalize(kind: &str) -> &str {
    match kind {
        "pod" | "pods" | "po" => "pods",
        "node" | "nodes" | "no" => "nodes",
        "event" | "events" | "ev" => "events",
        other => other,
    }
}

fn pod_json(pod: &MockPod) -> Value {
    let state = match pod.waiting_reason {
        Some(reason) => json!({"waiting": {"reason": reason}}),
        None if pod.phase == "Running" => json!({"running": {"startedAt": "2025-01-15T09:00:00Z"}}),
        None => json!({"waiting": {"reason": "ContainerCreating"}}),
    };
    let mut status = json!({
        "phase": pod.phase,
        "containerStatuses": [{
            "name": pod.app,
            "ready": pod.ready,
            "restartCount": pod.restarts,
            "state": state
        }]
    });
    // An unscheduled pod has no containers yet.
    if pod.node.is_none() {
        status["containerStatuses"] = json!([]);
        status["conditions"] = json!([{
            "type": "PodScheduled",
            "status": "False",
            "reason": "Unschedulable"
        }]);
    }
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": pod.name, "namespace": pod.namespace, "labels": {"app": pod.app}},
        "spec": {"nodeName": pod.node},
        "status": status
    })
}

fn list(items: Vec<Value>) -> Value {
    json!({"apiVersion": "v1", "kind": "List", "items": items})
}

fn render(value: &Value) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
}

fn get_pods(
    state: &ClusterState,
    parsed: &Parsed<'_>,
    namespace: &str,
    name: Option<&str>,
    json_out: bool,
) -> Result<String, ToolError> {
    let pods: Vec<&MockPod> = state
        .pods
        .iter()
        .filter(|p| parsed.all_namespaces || p.namespace == namespace)
        .filter(|p| name.map_or(true, |n| p.name == n))
        .collect();

    if let Some(name) = name {
        let pod = pods.first().ok_or_else(|| not_found("pods", name))?;
        if json_out {
            return render(&pod_json(pod));
        }
    }

    if json_out {
        return render(&list(pods.into_iter().map(pod_json).collect()));
    }

    let mut lines = vec!["NAME                          READY   STATUS             RESTARTS".to_string()];
    for pod in pods {
        let status = pod.waiting_reason.unwrap_or(pod.phase);
        lines.push(format!(
            "{:<29} {}/1     {:<18} {}",
            pod.name,
            u8::from(pod.ready),
            status,
            pod.restarts
        ));
    }
    Ok(lines.join("\n"))
}

fn get_nodes(state: &ClusterState, name: Option<&str>, json_out: bool) -> Result<String, ToolError> {
    let nodes: Vec<&MockNode> = state
        .nodes
        .iter()
        .filter(|n| name.map_or(true, |wanted| n.name == wanted))
        .collect();
    if let (Some(name), true) = (name, nodes.is_empty()) {
        return Err(not_found("nodes", name));
    }

    if json_out {
        let items = nodes
            .iter()
            .map(|n| {
                json!({
                    "apiVersion": "v1",
                    "kind": "Node",
                    "metadata": {"name": n.name},
                    "status": {"conditions": [
                        {"type": "MemoryPressure", "status": if n.memory_pressure { "True" } else { "False" }},
                        {"type": "DiskPressure", "status": "False"},
                        {"type": "Ready", "status": if n.ready { "True" } else { "False" }}
                    ]}
                })
            })
            .collect();
        return render(&list(items));
    }

    let mut lines = vec!["NAME     STATUS".to_string()];
    for node in nodes {
        lines.push(format!(
            "{:<8} {}",
            node.name,
            if node.ready { "Ready" } else { "NotReady" }
        ));
    }
    Ok(lines.join("\n"))
}

fn get_events(
    state: &ClusterState,
    parsed: &Parsed<'_>,
    namespace: &str,
    json_out: bool,
) -> Result<String, ToolError> {
    let events: Vec<&MockEvent> = state
        .events
        .iter()
        .filter(|e| parsed.all_namespaces || e.namespace == namespace)
        .collect();

    if json_out {
        let items = events
            .iter()
            .map(|e| {
                json!({
                    "apiVersion": "v1",
                    "kind": "Event",
                    "metadata": {"namespace": e.namespace},
                    "type": e.kind,
                    "reason": e.reason,
                    "message": e.message,
                    "involvedObject": {"kind": e.object.0, "name": e.object.1},
                    "count": e.count,
                    "lastTimestamp": e.last_seen
                })
            })
            .collect();
        return render(&list(items));
    }

    let lines: Vec<String> = events
        .iter()
        .map(|e| format!("{}  {}  {}/{}  {}", e.kind, e.reason, e.object.0, e.object.1, e.message))
        .collect();
    Ok(lines.join("\n"))
}

fn find_pod<'s>(state: &'s ClusterState, namespace: &str, name: &str) -> Result<&'s MockPod, ToolError> {
    state
        .pods
        .iter()
        .find(|p| p.namespace == namespace && p.name == name)
        .ok_or_else(|| not_found("pods", name))
}

fn describe_pod(state: &ClusterState, namespace: &str, name: &str) -> Result<String, ToolError> {
    let pod = find_pod(state, namespace, name)?;
    let mut out = vec![
        format!("Name:         {}", pod.name),
        format!("Namespace:    {}", pod.namespace),
        format!("Node:         {}", pod.node.unwrap_or("<none>")),
        format!("Labels:       app={}", pod.app),
        format!("Status:       {}", pod.phase),
        "Containers:".to_string(),
        format!("  {}:", pod.app),
    ];
    match pod.waiting_reason {
        Some(reason) => {
            out.push("    State:          Waiting".to_string());
            out.push(format!("      Reason:       {reason}"));
            out.push("    Last State:     Terminated".to_string());
            out.push("      Reason:       Error".to_string());
            out.push("      Exit Code:    1".to_string());
        }
        None if pod.phase == "Running" => out.push("    State:          Running".to_string()),
        None => out.push("    State:          Waiting".to_string()),
    }
    out.push(format!("    Ready:          {}", if pod.ready { "True" } else { "False" }));
    out.push(format!("    Restart Count:  {}", pod.restarts));
    out.push("Events:".to_string());
    let related: Vec<&MockEvent> = state
        .events
        .iter()
        .filter(|e| e.object == ("Pod", pod.name))
        .collect();
    if related.is_empty() {
        out.push("  <none>".to_string());
    }
    for event in related {
        out.push(format!(
            "  {:<8} {:<16} (x{}) {}",
            event.kind, event.reason, event.count, event.message
        ));
    }
    Ok(out.join("\n"))
}

fn logs(state: &ClusterState, parsed: &Parsed<'_>, namespace: &str, name: &str) -> Result<String, ToolError> {
    let pod = find_pod(state, namespace, name)?;
    let lines = if parsed.previous {
        if pod.previous_logs.is_empty() {
            return Err(ToolError::ExecutionFailed(format!(
                "kubectl command failed with exit code 1: previous terminated container \"{}\" in pod \"{}\" not found",
                pod.app, pod.name
            )));
        }
        pod.previous_logs
    } else {
        pod.logs
    };
    let skip = parsed.tail.map_or(0, |n| lines.len().saturating_sub(n));
    Ok(lines[skip..].join("\n"))
}

fn delete_pod(
    state: &mut ClusterState,
    parsed: &Parsed<'_>,
    namespace: &str,
    name: &str,
) -> Result<String, ToolError> {
    let position = state
        .pods
        .iter()
        .position(|p| p.namespace == namespace && p.name == name)
        .ok_or_else(|| not_found("pods", name))?;
    if parsed.dry_run {
        return Ok(format!("pod \"{name}\" deleted (dry run)"));
    }
    state.pods.remove(position);
    Ok(format!("pod \"{name}\" deleted"))
}
