//! Sandbox Dispatcher: routes a tool execution request to the owning
//! agent's worker, creating or restarting it transparently.

use crate::agent::roles::Role as AgentRole;
use crate::constants::{DEFAULT_SANDBOX_REQUEST_TIMEOUT_SECONDS, DEFAULT_SANDBOX_RESPONSE_TIMEOUT_SECONDS};
use crate::sandbox::worker::{SandboxWorker, ToolExecutionRequest, ToolExecutionResponse, ToolExecutor};
use crate::{AgentId, Result, RuntimeError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SandboxDispatcherConfig {
    pub request_timeout: Duration,
    pub response_timeout: Duration,
    pub worker_queue_capacity: usize,
}

impl Default for SandboxDispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_SANDBOX_REQUEST_TIMEOUT_SECONDS),
            response_timeout: Duration::from_secs(DEFAULT_SANDBOX_RESPONSE_TIMEOUT_SECONDS),
            worker_queue_capacity: 32,
        }
    }
}

/// A cheap, `Clone`-able reference to a sandbox: child agents inherit their
/// parent's handle by default (spec.md's assumed default per the §9 open
/// question, resolved in SPEC_FULL.md §14), so spawning a child never
/// implies spawning a new sandbox unless asked.
#[derive(Clone)]
pub struct SandboxHandle {
    dispatcher: Arc<SandboxDispatcher>,
}

impl SandboxHandle {
    pub fn new(dispatcher: Arc<SandboxDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn execute(&self, agent_id: &AgentId, tool_name: &str, kwargs: serde_json::Value) -> Result<ToolExecutionResponse> {
        self.dispatcher
            .execute(agent_id, ToolExecutionRequest { tool_name: tool_name.to_string(), kwargs })
            .await
    }

    /// The underlying dispatcher, for wiring the out-of-process [`crate::sandbox::rpc`]
    /// surface alongside the in-process worker path this handle normally uses.
    pub fn dispatcher(&self) -> Arc<SandboxDispatcher> {
        self.dispatcher.clone()
    }
}

pub struct SandboxDispatcher {
    config: SandboxDispatcherConfig,
    executor: Arc<dyn ToolExecutor>,
    workers: RwLock<HashMap<AgentId, Arc<SandboxWorker>>>,
}

impl SandboxDispatcher {
    pub fn new(config: SandboxDispatcherConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { config, executor, workers: RwLock::new(HashMap::new()) }
    }

    pub async fn ensure_worker(&self, agent_id: AgentId) -> Arc<SandboxWorker> {
        {
            let workers = self.workers.read().await;
            if let Some(worker) = workers.get(&agent_id) {
                if !worker.is_dead() {
                    return worker.clone();
                }
            }
        }

        let mut workers = self.workers.write().await;
        if let Some(worker) = workers.get(&agent_id) {
            if !worker.is_dead() {
                return worker.clone();
            }
            warn!(agent_id = %agent_id, "sandbox worker died, restarting");
        }

        let worker = Arc::new(SandboxWorker::spawn(
            agent_id.clone(),
            self.executor.clone(),
            self.config.worker_queue_capacity,
        ));
        info!(agent_id = %agent_id, "sandbox worker registered");
        workers.insert(agent_id, worker.clone());
        worker
    }

    pub async fn execute(&self, agent_id: &AgentId, request: ToolExecutionRequest) -> Result<ToolExecutionResponse> {
        let worker = self.ensure_worker(agent_id.clone()).await;
        worker.execute(request, self.config.request_timeout, self.config.response_timeout).await
    }

    pub async fn agent_ids(&self) -> Vec<AgentId> {
        self.workers.read().await.keys().cloned().collect()
    }

    /// Checked entry point used by the Action Registry: a request is
    /// rejected before it ever reaches a worker queue if the invoking
    /// role's module is not in its allowed set.
    pub async fn execute_with_role_check(
        &self,
        agent_id: &AgentId,
        role: &AgentRole,
        module: &str,
        request: ToolExecutionRequest,
    ) -> Result<ToolExecutionResponse> {
        if !role.allows_module(module) {
            return Err(RuntimeError::PermissionDenied {
                role: role.to_string(),
                action: request.tool_name,
            });
        }
        self.execute(agent_id, request).await
    }
}
