//! Process-backed [`ToolExecutor`]: the default production tool surface,
//! standing in for `runtime/tool_server.py`'s `agent_worker` subprocess
//! execution. Only `execute_script` is understood here — every other
//! builtin action resolves entirely in-process (see
//! `crate::actions::builtin`) and never reaches a sandbox worker at all.

use crate::sandbox::worker::{ToolExecutionResponse, ToolExecutor};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

/// Caps how much combined stdout/stderr a single script run reports back,
/// so a runaway script can't blow up an agent's conversation history.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

pub struct ProcessToolExecutor;

impl ProcessToolExecutor {
    pub fn new() -> Self {
        Self
    }

    fn truncate(mut s: String) -> String {
        if s.len() > MAX_OUTPUT_BYTES {
            s.truncate(MAX_OUTPUT_BYTES);
            s.push_str("\n...[truncated]");
        }
        s
    }

    async fn run_script(&self, kwargs: Value) -> Result<Value, String> {
        let interpreter = kwargs.get("interpreter").and_then(Value::as_str).ok_or("missing 'interpreter'")?;
        let content = kwargs.get("content").and_then(Value::as_str).ok_or("missing 'content'")?;
        let timeout_seconds = kwargs.get("timeout_seconds").and_then(Value::as_u64).unwrap_or(60);
        let parameters: Vec<String> = match kwargs.get("parameters") {
            Some(Value::Object(map)) => map.values().map(|v| v.to_string()).collect(),
            Some(Value::Array(items)) => items.iter().map(|v| v.to_string()).collect(),
            _ => Vec::new(),
        };

        let mut child = Command::new(interpreter)
            .arg("-")
            .args(&parameters)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn '{interpreter}': {e}"))?;

        let mut stdin = child.stdin.take().ok_or("child process had no stdin")?;
        let content = content.to_string();
        let write_task = tokio::spawn(async move {
            let _ = stdin.write_all(content.as_bytes()).await;
        });

        let wait = tokio::time::timeout(std::time::Duration::from_secs(timeout_seconds), child.wait_with_output());
        let output = match wait.await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("script process failed: {e}")),
            Err(_) => return Err(format!("script timed out after {timeout_seconds}s")),
        };
        let _ = write_task.await;

        Ok(serde_json::json!({
            "stdout": Self::truncate(String::from_utf8_lossy(&output.stdout).into_owned()),
            "stderr": Self::truncate(String::from_utf8_lossy(&output.stderr).into_owned()),
            "exit_code": output.status.code(),
        }))
    }
}

impl Default for ProcessToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ProcessToolExecutor {
    async fn execute(&self, tool_name: &str, kwargs: Value) -> ToolExecutionResponse {
        if tool_name != "execute_script" {
            return ToolExecutionResponse { result: None, error: Some(format!("unsupported tool '{tool_name}'")) };
        }
        match self.run_script(kwargs).await {
            Ok(result) => ToolExecutionResponse { result: Some(result), error: None },
            Err(e) => {
                warn!(error = %e, "script execution failed");
                ToolExecutionResponse { result: None, error: Some(e) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_bash_script_and_captures_stdout() {
        let executor = ProcessToolExecutor::new();
        let response = executor
            .execute(
                "execute_script",
                serde_json::json!({
                    "interpreter": "/bin/bash",
                    "content": "echo hello",
                    "timeout_seconds": 5,
                }),
            )
            .await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["stdout"], "hello\n");
    }

    #[tokio::test]
    async fn unsupported_tool_name_is_an_error() {
        let executor = ProcessToolExecutor::new();
        let response = executor.execute("terminal.run", serde_json::json!({})).await;
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn missing_interpreter_is_an_error() {
        let executor = ProcessToolExecutor::new();
        let response = executor.execute("execute_script", serde_json::json!({"content": "echo hi"})).await;
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn exceeding_timeout_is_reported_as_an_error() {
        let executor = ProcessToolExecutor::new();
        let response = executor
            .execute(
                "execute_script",
                serde_json::json!({
                    "interpreter": "/bin/bash",
                    "content": "sleep 5",
                    "timeout_seconds": 1,
                }),
            )
            .await;
        assert!(response.error.is_some());
    }
}
