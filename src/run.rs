//! Run: the top-level handle a binary holds for one fleet run — an
//! [`AgentRuntime`] plus its [`HealthMonitor`], and optionally the
//! out-of-process sandbox RPC surface, started and torn down together.
//!
//! Mirrors the shape of the teacher's `main.rs`, which races an orchestrator
//! loop against an API server under one `tokio::select!`; here the
//! equivalent race is the fleet's top-level task against the sandbox RPC
//! listener, when the caller opts into exposing one.

use crate::agent::roles::Role;
use crate::agent::runtime::{AgentRuntime, RuntimeBuilder};
use crate::monitoring::{HealthMonitor, MonitoringConfig};
use crate::sandbox::rpc::{self, RpcState};
use crate::sandbox::worker::ToolExecutor;
use crate::thinker::http::Thinker;
use crate::{Result, RuntimeConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Bearer-token-protected HTTP surface an out-of-process sandbox worker
/// would call. Left unset, a [`Run`] only ever dispatches tools in-process.
pub struct SandboxRpcConfig {
    pub bind_addr: SocketAddr,
    pub bearer_token: String,
}

pub struct Run {
    runtime: Arc<AgentRuntime>,
    monitor: Arc<HealthMonitor>,
}

impl Run {
    /// Builds the runtime, opens its run directory, and starts the
    /// background health monitor. The run directory layout itself
    /// (`events.jsonl`, `metadata.json`, `vulnerabilities/`, ...) is the
    /// tracer's responsibility — this just assembles the collaborators that
    /// write into it.
    pub async fn start(
        config: RuntimeConfig,
        thinker: Arc<dyn Thinker>,
        executor: Arc<dyn ToolExecutor>,
        runs_root: impl Into<PathBuf>,
        run_name: String,
    ) -> Result<Arc<Self>> {
        let runtime = RuntimeBuilder::new(config)
            .thinker(thinker)
            .tool_executor(executor)
            .runs_root(runs_root)
            .build(run_name)
            .await?;

        let monitor = Arc::new(HealthMonitor::new(runtime.clone(), MonitoringConfig::default()));
        monitor.start().await;

        Ok(Arc::new(Self { runtime, monitor }))
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Registers a top-level agent under `role` for `task` and drives it to
    /// completion, returning its final result (or its failure reason as an
    /// error).
    pub async fn execute(&self, role: Role, task: String) -> Result<serde_json::Value> {
        self.runtime.run(role, task).await
    }

    /// Races the fleet's top-level task against the sandbox RPC listener
    /// (when `rpc_config` is given), returning once either side finishes —
    /// same shape as the teacher's `tokio::select!` over its orchestrator
    /// and API server. Always shuts the health monitor down on the way out.
    pub async fn run_to_completion(
        self: &Arc<Self>,
        role: Role,
        task: String,
        rpc_config: Option<SandboxRpcConfig>,
    ) -> Result<serde_json::Value> {
        let result = match rpc_config {
            None => self.execute(role, task).await,
            Some(rpc_config) => {
                tokio::select! {
                    result = self.execute(role, task) => result,
                    result = self.serve_sandbox_rpc(rpc_config) => {
                        result?;
                        Ok(serde_json::Value::Null)
                    }
                }
            }
        };

        self.monitor.shutdown().await;
        if let Err(e) = self.runtime.shutdown().await {
            tracing::warn!(error = %e, "failed to persist final run state");
        }
        result
    }

    async fn serve_sandbox_rpc(&self, rpc_config: SandboxRpcConfig) -> Result<()> {
        let state = RpcState {
            dispatcher: self.runtime.sandbox().dispatcher(),
            expected_token: Arc::from(rpc_config.bearer_token.as_str()),
        };
        info!(addr = %rpc_config.bind_addr, "serving sandbox rpc surface");
        let listener = tokio::net::TcpListener::bind(rpc_config.bind_addr).await?;
        axum::serve(listener, rpc::router(state)).await?;
        Ok(())
    }
}
