//! # sleuth-kube
//!
//! Kubernetes diagnostic tools for kubesleuth.
//!
//! Every tool builds a kubectl argument list and hands it to a
//! [`KubectlRunner`]: [`ProcessKubectl`] runs the real binary with a bounded
//! wait, and [`MockCluster`] answers from a small fictional cluster for
//! offline runs and tests.
//!
//! | Tool | Reads | Dangerous |
//! |---|---|---|
//! | `kubectl` | any read-only command | no |
//! | `check_pod_status` | pods in a namespace | no |
//! | `get_logs` | a container's logs | no |
//! | `describe_pod` | one pod and its events | no |
//! | `check_node_status` | node conditions | no |
//! | `check_cluster_events` | recent events | no |
//! | `delete_pod` | deletes a pod, honours dry run | yes |

pub mod command;
pub mod config;
pub mod mock;
pub mod runner;
pub mod tools;

use std::sync::Arc;

use sleuth_contracts::error::{SleuthResult, ToolError};
use sleuth_core::{traits::Tool, ToolRegistry};

pub use config::KubectlConfig;
pub use mock::MockCluster;
pub use runner::{KubectlRunner, ProcessKubectl};
pub use tools::KubeBackend;

use tools::{
    health::{CheckClusterEvents, CheckNodeStatus, CHECK_CLUSTER_EVENTS, CHECK_NODE_STATUS},
    kubectl::{self, KubectlTool},
    workload::{CheckPodStatus, DeletePod, DescribePod, GetLogs, CHECK_POD_STATUS, DELETE_POD, DESCRIBE_POD, GET_LOGS},
};

fn register<T, B>(registry: &mut ToolRegistry, name: &str, backend: &KubeBackend, build: B) -> SleuthResult<()>
where
    T: Tool + 'static,
    B: Fn(KubeBackend) -> Result<T, ToolError> + Send + Sync + 'static,
{
    let backend = backend.clone();
    registry.register(name, move || {
        let tool: Arc<dyn Tool> = Arc::new(build(backend.clone())?);
        Ok(tool)
    })
}

/// Register every Kubernetes tool against `runner`.
///
/// Tools are built lazily by the registry, so a broken schema surfaces as an
/// unavailable tool rather than a startup failure.
///
/// # Errors
///
/// `AlreadyRegistered` if any of the names is already taken.
pub fn register_default_tools(
    registry: &mut ToolRegistry,
    runner: Arc<dyn KubectlRunner>,
    config: KubectlConfig,
) -> SleuthResult<()> {
    let backend = KubeBackend::new(runner, config);
    register(registry, kubectl::NAME, &backend, KubectlTool::new)?;
    register(registry, CHECK_POD_STATUS, &backend, CheckPodStatus::new)?;
    register(registry, GET_LOGS, &backend, GetLogs::new)?;
    register(registry, DESCRIBE_POD, &backend, DescribePod::new)?;
    register(registry, CHECK_NODE_STATUS, &backend, CheckNodeStatus::new)?;
    register(registry, CHECK_CLUSTER_EVENTS, &backend, CheckClusterEvents::new)?;
    register(registry, DELETE_POD, &backend, DeletePod::new)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
