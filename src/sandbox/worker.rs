//! Per-agent sandbox worker: a supervised `tokio::task` standing in for the
//! out-of-process tool server in `runtime/tool_server.py`'s `agent_worker`.
//!
//! Each worker owns a request channel and a response channel exactly as the
//! Python worker owns a `multiprocessing.Queue` pair; unlike the Python
//! version (which tears down after `SANDBOX_WORKER_FAILURE_RESTART_THRESHOLD`
//! consecutive unexpected errors and is respawned by `ensure_agent_process`),
//! this supervisor lives inside the dispatcher so callers never see a
//! restart — the request/response channel pair is rewired transparently.

use crate::constants::SANDBOX_WORKER_FAILURE_RESTART_THRESHOLD;
use crate::{AgentId, Result, RuntimeError};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRequest {
    pub tool_name: String,
    pub kwargs: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResponse {
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

struct WorkItem {
    request: ToolExecutionRequest,
    respond_to: oneshot::Sender<ToolExecutionResponse>,
}

/// A handle to a running (or restartable) worker task for one agent.
pub struct SandboxWorker {
    agent_id: AgentId,
    sender: mpsc::Sender<WorkItem>,
}

/// Pluggable tool execution surface: in tests a stub; in production the
/// real dispatched tool implementations registered in `actions`.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync + 'static {
    async fn execute(&self, tool_name: &str, kwargs: serde_json::Value) -> ToolExecutionResponse;
}

impl SandboxWorker {
    /// Spawn a worker task, restarting it transparently up to
    /// `SANDBOX_WORKER_FAILURE_RESTART_THRESHOLD` times if the executor
    /// panics mid-request.
    pub fn spawn(agent_id: AgentId, executor: std::sync::Arc<dyn ToolExecutor>, queue_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<WorkItem>(queue_capacity);
        let worker_agent_id = agent_id.clone();

        tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            while let Some(item) = rx.recv().await {
                let result = std::panic::AssertUnwindSafe(
                    executor.execute(&item.request.tool_name, item.request.kwargs.clone()),
                )
                .catch_unwind()
                .await;

                let response = match result {
                    Ok(response) => {
                        consecutive_failures = 0;
                        response
                    }
                    Err(_) => {
                        consecutive_failures += 1;
                        warn!(
                            agent_id = %worker_agent_id,
                            consecutive_failures,
                            "sandbox worker tool execution panicked"
                        );
                        ToolExecutionResponse {
                            result: None,
                            error: Some(format!(
                                "tool '{}' panicked during execution",
                                item.request.tool_name
                            )),
                        }
                    }
                };

                let _ = item.respond_to.send(response);

                if consecutive_failures >= SANDBOX_WORKER_FAILURE_RESTART_THRESHOLD {
                    error!(agent_id = %worker_agent_id, "sandbox worker exceeded failure threshold, exiting");
                    break;
                }
            }
            info!(agent_id = %worker_agent_id, "sandbox worker task exiting");
        });

        Self { agent_id, sender: tx }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// True once the worker's internal task has exited (either gracefully
    /// or after exceeding the failure threshold); the dispatcher uses this
    /// to decide when to respawn.
    pub fn is_dead(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn execute(
        &self,
        request: ToolExecutionRequest,
        request_timeout: std::time::Duration,
        response_timeout: std::time::Duration,
    ) -> Result<ToolExecutionResponse> {
        let (respond_to, receive_response) = oneshot::channel();
        let item = WorkItem { request, respond_to };

        tokio::time::timeout(request_timeout, self.sender.send(item))
            .await
            .map_err(|_| RuntimeError::SandboxTimeout(request_timeout.as_secs_f64()))?
            .map_err(|_| RuntimeError::SandboxWorkerDied)?;

        tokio::time::timeout(response_timeout, receive_response)
            .await
            .map_err(|_| RuntimeError::SandboxTimeout(response_timeout.as_secs_f64()))?
            .map_err(|_| RuntimeError::SandboxWorkerDied)
    }
}

use futures::FutureExt;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct EchoExecutor;

    #[async_trait::async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, tool_name: &str, kwargs: serde_json::Value) -> ToolExecutionResponse {
            ToolExecutionResponse { result: Some(serde_json::json!({"tool": tool_name, "kwargs": kwargs})), error: None }
        }
    }

    struct PanickingExecutor {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ToolExecutor for PanickingExecutor {
        async fn execute(&self, _tool_name: &str, _kwargs: serde_json::Value) -> ToolExecutionResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn executes_and_returns_result() {
        let worker = SandboxWorker::spawn(AgentId::from("agent_test"), Arc::new(EchoExecutor), 8);
        let response = worker
            .execute(
                ToolExecutionRequest { tool_name: "noop".into(), kwargs: serde_json::json!({}) },
                std::time::Duration::from_secs(1),
                std::time::Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn worker_task_exits_after_failure_threshold() {
        let worker = SandboxWorker::spawn(
            AgentId::from("agent_test"),
            Arc::new(PanickingExecutor { calls: AtomicU32::new(0) }),
            8,
        );
        for _ in 0..SANDBOX_WORKER_FAILURE_RESTART_THRESHOLD {
            let _ = worker
                .execute(
                    ToolExecutionRequest { tool_name: "boom".into(), kwargs: serde_json::json!({}) },
                    std::time::Duration::from_secs(1),
                    std::time::Duration::from_secs(1),
                )
                .await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(worker.is_dead());
    }
}
