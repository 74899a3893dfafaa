//! Agent Runtime: the iteration loop that drives a single agent through the
//! thinker -> parse -> dispatch -> reconcile cycle, and the fleet-level
//! entry points (`run`, `launch`, `send_message`, `request_stop`) built on
//! top of it.
//!
//! Grounded in `original_source/strix/agents/base_agent.py`'s
//! `_run_iteration` loop, restated per spec.md §4.1's 8-step algorithm. The
//! Python version reaches into a module-level `get_event_tracer()` and a
//! single global `ActionRegistry`; here every collaborator is constructed
//! once by [`RuntimeBuilder`] and held as an `Arc`, consistent with spec.md
//! §9's anti-singleton guidance.

use crate::actions::builtin::{self, BuiltinCollaborators};
use crate::actions::{ActionContext, ActionRegistry, AgentLauncher};
use crate::agent::arena::AgentArena;
use crate::agent::parser;
use crate::agent::roles::Role;
use crate::agent::state::{AgentState, AgentStatus};
use crate::constants::{
    CONSECUTIVE_EMPTY_RESPONSE_LIMIT, CONSECUTIVE_EMPTY_RESPONSE_WARNING, PARALLEL_ACTION_CONCURRENCY,
};
use crate::memory::{self, CompactionPolicy};
use crate::models::{ActionInvocation, Message};
use crate::notes::NotesStore;
use crate::progress::ProgressStore;
use crate::actions::scripts::ScriptStore;
use crate::reconciler::Reconciler;
use crate::sandbox::dispatcher::{SandboxDispatcher, SandboxDispatcherConfig, SandboxHandle};
use crate::sandbox::worker::ToolExecutor;
use crate::thinker::http::Thinker;
use crate::thinker::ThinkerClient;
use crate::tracer::{EventBuilder, EventKind, Tracer};
use crate::{AgentId, Result, RuntimeConfig, RuntimeError};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Starts a freshly-spawned agent's iteration loop without the caller
/// waiting for it. Implemented as a thin wrapper around a [`Weak`] handle to
/// the owning [`AgentRuntime`] so `actions::builtin::SpawnAgentAction` can
/// hold an `Arc<dyn AgentLauncher>` that was constructed before the runtime
/// `Arc` it points back into existed (see [`AgentRuntime::build`]).
struct RuntimeLauncher {
    runtime: Weak<AgentRuntime>,
}

#[async_trait::async_trait]
impl AgentLauncher for RuntimeLauncher {
    async fn launch(&self, agent_id: AgentId) {
        let Some(runtime) = self.runtime.upgrade() else {
            warn!(%agent_id, "launch requested after runtime was dropped");
            return;
        };
        tokio::spawn(async move { runtime.run_agent_loop(agent_id).await });
    }
}

pub struct AgentRuntime {
    config: RuntimeConfig,
    thinker_client: ThinkerClient,
    sandbox: Arc<SandboxHandle>,
    tracer: Arc<Tracer>,
    arena: Arc<AgentArena>,
    actions: Arc<ActionRegistry>,
}

impl AgentRuntime {
    /// Constructs every collaborator and wires the [`AgentLauncher`]/
    /// `ActionRegistry` cycle via `Arc::new_cyclic`: the registry needs a
    /// launcher handle before the runtime `Arc` it launches into exists, so
    /// the launcher only ever holds a [`Weak`] reference, upgraded at the
    /// moment a `spawn_agent` invocation actually needs to start a loop.
    pub async fn build(
        config: RuntimeConfig,
        thinker: Arc<dyn Thinker>,
        executor: Arc<dyn ToolExecutor>,
        runs_root: impl Into<PathBuf>,
        run_name: String,
    ) -> Result<Arc<Self>> {
        let tracer = Arc::new(Tracer::create(runs_root, run_name).await?);
        let arena = Arc::new(AgentArena::new());
        let thinker_client = ThinkerClient::new(&config, thinker);

        let dispatcher = Arc::new(SandboxDispatcher::new(
            SandboxDispatcherConfig {
                request_timeout: std::time::Duration::from_secs(config.sandbox_request_timeout_seconds),
                response_timeout: std::time::Duration::from_secs(config.sandbox_response_timeout_seconds),
                ..Default::default()
            },
            executor,
        ));
        let sandbox = Arc::new(SandboxHandle::new(dispatcher));

        let notes = Arc::new(NotesStore::open(tracer.run_dir()).await?);
        let progress = Arc::new(ProgressStore::open(tracer.run_dir()).await?);
        let scripts = Arc::new(ScriptStore::open(tracer.run_dir()).await?);

        tracer.save_metadata().await?;

        Ok(Arc::new_cyclic(|weak: &Weak<AgentRuntime>| {
            let launcher: Arc<dyn AgentLauncher> = Arc::new(RuntimeLauncher { runtime: weak.clone() });
            let collaborators = BuiltinCollaborators {
                arena: arena.clone(),
                tracer: tracer.clone(),
                notes,
                progress,
                scripts,
                sandbox: sandbox.clone(),
                launcher,
            };
            let actions = builtin::register_builtin_actions(ActionRegistry::builder(), &collaborators).build();

            AgentRuntime { config, thinker_client, sandbox, tracer, arena, actions }
        }))
    }

    pub fn arena(&self) -> &Arc<AgentArena> {
        &self.arena
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    pub fn thinker_client(&self) -> &ThinkerClient {
        &self.thinker_client
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &Arc<SandboxHandle> {
        &self.sandbox
    }

    /// Registers a new agent in the arena, seeding its conversation with the
    /// role's system prompt and the task as the first user turn, without
    /// starting its loop.
    async fn register(&self, role: Role, task: String, parent: Option<&AgentState>) -> AgentId {
        let mut state = match parent {
            Some(parent) => AgentState::child(role, task.clone(), parent),
            None => AgentState::new(role, task.clone(), self.config.max_iterations, self.config.max_wait_seconds),
        };
        state.add_message(Message::system(role.system_prompt()));
        state.add_message(Message::user(task));
        let id = state.agent_id.clone();
        self.arena.insert(state).await;
        id
    }

    /// Registers and starts a top-level agent, then blocks until it reaches
    /// a terminal or parked state, returning its final result.
    pub async fn run(self: &Arc<Self>, role: Role, task: String) -> Result<Value> {
        let agent_id = self.register(role, task.clone(), None).await;
        self.tracer.log_agent_creation(agent_id.clone(), role, &task, None).await?;
        Arc::clone(self).run_agent_loop(agent_id.clone()).await;

        let handle = self.arena.get(&agent_id).await?;
        let state = handle.lock().await;
        match state.status {
            AgentStatus::Completed => Ok(state.final_result.clone().unwrap_or(Value::Null)),
            AgentStatus::Failed => {
                Err(RuntimeError::Agent(state.failure_reason.clone().unwrap_or_else(|| "agent failed".to_string())))
            }
            other => Ok(json!({"status": format!("{other:?}"), "agent_id": agent_id.to_string()})),
        }
    }

    /// Registers a top-level agent and starts its loop in the background,
    /// returning its id immediately.
    pub async fn launch(self: &Arc<Self>, role: Role, task: String) -> AgentId {
        let agent_id = self.register(role, task.clone(), None).await;
        if let Err(e) = self.tracer.log_agent_creation(agent_id.clone(), role, &task, None).await {
            warn!(%agent_id, error = %e, "failed to log agent creation event");
        }
        let runtime = Arc::clone(self);
        let id = agent_id.clone();
        tokio::spawn(async move { runtime.run_agent_loop(id).await });
        agent_id
    }

    pub async fn send_message(&self, agent_id: &AgentId, content: String) -> Result<()> {
        self.arena.send_message(agent_id, Message::user(content)).await
    }

    pub async fn request_stop(&self, agent_id: &AgentId) -> Result<()> {
        let handle = self.arena.get(agent_id).await?;
        handle.lock().await.request_stop();
        Ok(())
    }

    async fn run_agent_loop(self: Arc<Self>, agent_id: AgentId) {
        loop {
            match self.run_iteration(&agent_id).await {
                Ok(stop) if stop => break,
                Ok(_) => continue,
                Err(e) => {
                    error!(%agent_id, error = %e, "agent iteration failed unrecoverably, stopping agent");
                    if let Ok(handle) = self.arena.get(&agent_id).await {
                        let mut state = handle.lock().await;
                        state.add_error(e.to_string());
                        state.set_failed(e.to_string());
                    }
                    break;
                }
            }
        }
        let agents_count = self.arena.len().await;
        if let Err(e) = self.tracer.save_run_state(false, agents_count).await {
            warn!(%agent_id, error = %e, "failed to persist run state after agent loop exit");
        }
    }

    /// One pass of spec.md §4.1's 8-step loop. Returns `Ok(true)` once the
    /// agent has reached a terminal or parked (waiting) state and the loop
    /// driving it should stop scheduling further iterations.
    async fn run_iteration(&self, agent_id: &AgentId) -> Result<bool> {
        let handle = self.arena.get(agent_id).await?;

        // 1. Stop conditions and mailbox drain, evaluated under one lock so
        // a concurrent `send_message` can't race a waiting agent's resume.
        {
            let mut state = handle.lock().await;
            if state.has_reached_max_iterations() && state.status == AgentStatus::Running {
                state.set_failed(format!("exceeded max_iterations ({})", state.max_iterations));
            }
            if state.should_stop() {
                return Ok(true);
            }
            if state.is_waiting_for_input() {
                if state.has_waiting_timeout() {
                    state.set_failed("exceeded max_wait_seconds while parked");
                    return Ok(true);
                }
                if !self.arena.has_pending_messages(agent_id).await {
                    return Ok(true);
                }
                for message in self.arena.drain_mailbox(agent_id).await {
                    state.add_message(message);
                }
                state.resume_from_waiting(None);
            }
        }

        let iteration = handle.lock().await.iteration;
        self.tracer.emit(EventBuilder::new(EventKind::AgentIteration).agent(agent_id.clone()).field("iteration", iteration)).await?;

        // 3. Compact the conversation before it goes to the thinker.
        {
            let mut state = handle.lock().await;
            memory::compact(&mut state.messages, CompactionPolicy::default());
        }

        // 4. Thinker call.
        let conversation = handle.lock().await.messages.clone();
        let response = match self.thinker_client.generate(&conversation).await {
            Ok(text) => text,
            Err(e) => {
                let mut state = handle.lock().await;
                state.add_error(format!("thinker request failed: {e}"));
                state.enter_waiting_state(true);
                return Ok(true);
            }
        };

        // 5. Append the assistant turn.
        {
            let mut state = handle.lock().await;
            state.add_message(Message::assistant(response.clone()));
        }

        // 6. Parse action invocations.
        let invocations = match parser::parse_invocations(&response) {
            Ok(invocations) => invocations,
            Err(e) => {
                handle.lock().await.add_error(format!("action parse error: {e}"));
                Vec::new()
            }
        };

        if invocations.is_empty() {
            let mut state = handle.lock().await;
            if state.consecutive_empty_responses >= CONSECUTIVE_EMPTY_RESPONSE_LIMIT {
                state.set_failed("exceeded consecutive non-actionable responses");
                return Ok(true);
            }
            if state.consecutive_empty_responses >= CONSECUTIVE_EMPTY_RESPONSE_WARNING {
                state.add_message(Message::user(
                    "No action was recognized in your last response. Invoke one of the documented \
                     actions using the <action name=\"...\"> format.",
                ));
            }
            state.increment_iteration();
            return Ok(false);
        }

        // 7. Dispatch: sequential first, then parallel, bounded concurrency.
        let role = handle.lock().await.role;
        let (sequential, parallel) = self.actions.plan(&invocations);

        for invocation in sequential {
            self.dispatch_and_record(agent_id, &handle, role, invocation).await;
            let state = handle.lock().await;
            if state.should_stop() || state.is_waiting_for_input() {
                return Ok(true);
            }
        }

        if !parallel.is_empty() {
            stream::iter(parallel.into_iter().map(|invocation| {
                let handle = handle.clone();
                async move { self.dispatch_and_record(agent_id, &handle, role, invocation).await }
            }))
            .buffer_unordered(PARALLEL_ACTION_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

            let state = handle.lock().await;
            if state.should_stop() || state.is_waiting_for_input() {
                return Ok(true);
            }
        }

        // 8. Advance and reconcile.
        {
            let mut state = handle.lock().await;
            state.increment_iteration();
            let issues = Reconciler::check(&state);
            if !issues.is_empty() {
                Reconciler::auto_fix(&mut state);
                Reconciler::inject_checkpoint(&mut state, &issues);
            }
        }

        Ok(false)
    }

    /// Runs one invocation to completion, recording its action/observation
    /// pair on `AgentState` and emitting the matching tracer events.
    /// `finish` and `wait` are intercepted here rather than dispatched
    /// through the registry, per `actions::builtin`'s module doc.
    async fn dispatch_and_record(
        &self,
        agent_id: &AgentId,
        handle: &Arc<Mutex<AgentState>>,
        role: Role,
        invocation: &ActionInvocation,
    ) {
        {
            let mut state = handle.lock().await;
            state.add_action(json!({"name": invocation.name, "arguments": invocation.arguments}));
        }

        if invocation.name == "finish" {
            let success = invocation.arguments.get("success").and_then(Value::as_bool).unwrap_or(true);
            let result = invocation.arguments.get("final_result").cloned();
            let mut state = handle.lock().await;
            if success {
                state.set_completed(result);
            } else {
                let reason = result.map(|v| v.to_string()).unwrap_or_else(|| "agent reported failure".to_string());
                state.set_failed(reason);
            }
            return;
        }
        if invocation.name == "wait" {
            handle.lock().await.enter_waiting_state(false);
            return;
        }

        let _ = self
            .tracer
            .emit(EventBuilder::new(EventKind::ActionStart).agent(agent_id.clone()).field("action", invocation.name.clone()))
            .await;

        let ctx = ActionContext { agent_id: agent_id.clone(), role };
        let result = self.actions.dispatch(&ctx, invocation).await;
        self.tracer.record_tool_execution();

        match result {
            Ok(value) => {
                let _ = self
                    .tracer
                    .emit(EventBuilder::new(EventKind::ActionEnd).agent(agent_id.clone()).field("action", invocation.name.clone()))
                    .await;
                let mut state = handle.lock().await;
                state.add_observation(value.clone());
                state.add_message(Message::tool(format!("[{}] {value}", invocation.name)));
            }
            Err(e) => {
                let _ = self
                    .tracer
                    .emit(
                        EventBuilder::new(EventKind::ActionError)
                            .agent(agent_id.clone())
                            .field("action", invocation.name.clone())
                            .field("error", e.to_string()),
                    )
                    .await;
                let mut state = handle.lock().await;
                state.add_error(format!("action '{}' failed: {e}", invocation.name));
                state.add_message(Message::tool(format!("[{}] error: {e}", invocation.name)));
            }
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        let agents_count = self.arena.len().await;
        self.tracer.save_run_state(true, agents_count).await
    }
}

/// Builds an [`AgentRuntime`] from explicitly supplied collaborators —
/// never a singleton, per spec.md §9.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    thinker: Option<Arc<dyn Thinker>>,
    executor: Option<Arc<dyn ToolExecutor>>,
    runs_root: PathBuf,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config, thinker: None, executor: None, runs_root: PathBuf::from(crate::constants::RUNS_ROOT_DIR) }
    }

    pub fn thinker(mut self, thinker: Arc<dyn Thinker>) -> Self {
        self.thinker = Some(thinker);
        self
    }

    pub fn tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn runs_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.runs_root = path.into();
        self
    }

    pub async fn build(self, run_name: String) -> Result<Arc<AgentRuntime>> {
        let thinker = self
            .thinker
            .ok_or_else(|| RuntimeError::Configuration("runtime builder missing a thinker transport".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| RuntimeError::Configuration("runtime builder missing a tool executor".to_string()))?;
        AgentRuntime::build(self.config, thinker, executor, self.runs_root, run_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::worker::ToolExecutionResponse;
    use crate::thinker::http::{ThinkerRawResponse, ThinkerRequest, ThinkerTransportError};
    use tempfile::tempdir;

    struct ScriptedThinker {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Thinker for ScriptedThinker {
        async fn complete(&self, _request: ThinkerRequest) -> std::result::Result<ThinkerRawResponse, ThinkerTransportError> {
            let mut responses = self.responses.lock().await;
            let content = if responses.is_empty() { String::new() } else { responses.remove(0) };
            Ok(ThinkerRawResponse { content, usage: Default::default() })
        }
    }

    struct NullExecutor;

    #[async_trait::async_trait]
    impl ToolExecutor for NullExecutor {
        async fn execute(&self, tool_name: &str, _kwargs: Value) -> ToolExecutionResponse {
            ToolExecutionResponse { result: None, error: Some(format!("no executor configured for '{tool_name}'")) }
        }
    }

    async fn test_runtime(responses: Vec<&str>) -> Arc<AgentRuntime> {
        let dir = tempdir().unwrap();
        let thinker = Arc::new(ScriptedThinker { responses: Mutex::new(responses.into_iter().map(String::from).collect()) });
        RuntimeBuilder::new(RuntimeConfig::default())
            .thinker(thinker)
            .tool_executor(Arc::new(NullExecutor))
            .runs_root(dir.path())
            .build("test-run".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn finish_action_completes_the_agent_with_its_result() {
        let runtime = test_runtime(vec![
            r#"<action name="finish"><arg name="success">true</arg><arg name="final_result">done</arg></action>"#,
        ])
        .await;
        let result = runtime.run(Role::FullAccess, "say done".to_string()).await.unwrap();
        assert_eq!(result, json!("done"));
    }

    #[tokio::test]
    async fn wait_action_parks_the_agent_without_error() {
        let runtime = test_runtime(vec![r#"<action name="wait"></action>"#]).await;
        let agent_id = runtime.launch(Role::FullAccess, "wait for input".to_string()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let handle = runtime.arena().get(&agent_id).await.unwrap();
        assert!(handle.lock().await.is_waiting_for_input());
    }

    #[tokio::test]
    async fn repeated_empty_responses_eventually_fail_the_agent() {
        let runtime = test_runtime(vec![""; 6]).await;
        let result = runtime.run(Role::FullAccess, "produce nothing".to_string()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_action_is_recorded_as_an_error_and_iteration_continues() {
        let runtime = test_runtime(vec![
            r#"<action name="not_a_real_action"></action>"#,
            r#"<action name="finish"><arg name="success">true</arg></action>"#,
        ])
        .await;
        let result = runtime.run(Role::FullAccess, "try something unknown".to_string()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn spawn_agent_registers_and_launches_a_child() {
        let runtime = test_runtime(vec![
            r#"<action name="spawn_agent"><arg name="role">reconnaissance</arg><arg name="task">enumerate hosts</arg></action>"#,
            r#"<action name="finish"><arg name="success">true</arg></action>"#,
        ])
        .await;
        runtime.run(Role::FullAccess, "delegate to a child".to_string()).await.unwrap();
        assert_eq!(runtime.arena().len().await, 2);
    }
}
