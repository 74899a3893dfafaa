//! Action Registry: declarative action metadata, role-based gating, and
//! argument coercion.
//!
//! Grounded in `original_source/strix/tools/registry.py`'s registration
//! shape and the teacher's argument-validation discipline. `Action` is a
//! trait registered once into a process-lifetime [`ActionRegistry`] (never
//! mutated after construction), fixing the Python registry's duck-typed
//! `@register_tool` decorator per spec.md §9's re-architecture guidance.

pub mod builtin;
pub mod scripts;

use crate::agent::roles::Role;
use crate::models::ActionInvocation;
use crate::{AgentId, Result, RuntimeError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-invocation context a handler needs but that the registry itself has
/// no business owning: which agent is calling, and under which role (so a
/// handler that fans out to the sandbox can re-check permissions there too).
pub struct ActionContext {
    pub agent_id: AgentId,
    pub role: Role,
}

/// Coerced, type-checked arguments handed to an [`Action`]'s handler.
pub struct ActionArgs {
    values: HashMap<String, Value>,
}

impl ActionArgs {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn missing(key: &str) -> RuntimeError {
        RuntimeError::ArgumentCoercion { argument: key.to_string(), message: "required argument missing".to_string() }
    }

    fn mismatch(key: &str, expected: &str) -> RuntimeError {
        RuntimeError::ArgumentCoercion { argument: key.to_string(), message: format!("expected {expected}") }
    }

    pub fn string(&self, key: &str) -> Result<String> {
        self.values.get(key).and_then(Value::as_str).map(str::to_string).ok_or_else(|| Self::missing(key))
    }

    pub fn string_opt(&self, key: &str) -> Result<Option<String>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| Self::mismatch(key, "string")),
        }
    }

    pub fn boolean(&self, key: &str, default: bool) -> Result<bool> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| Self::mismatch(key, "bool")),
        }
    }

    pub fn integer(&self, key: &str) -> Result<i64> {
        self.values.get(key).and_then(Value::as_i64).ok_or_else(|| Self::missing(key))
    }

    pub fn object(&self, key: &str) -> Result<Value> {
        self.values.get(key).cloned().ok_or_else(|| Self::missing(key))
    }

    pub fn string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(|| Self::mismatch(key, "list of strings")))
                .collect(),
            Some(_) => Err(Self::mismatch(key, "list of strings")),
        }
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ctx: &ActionContext, args: ActionArgs) -> Result<Value>;
}

/// Starts a freshly-registered agent's iteration loop. Implemented by
/// [`crate::agent::runtime::AgentRuntime`] and injected into
/// [`builtin::BuiltinCollaborators`] so `spawn_agent` can kick off its
/// child without `actions` depending on `agent::runtime` (which itself
/// depends on `actions` to build its registry).
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, agent_id: AgentId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequentiality {
    Sequential,
    Parallel,
}

pub struct ActionRegistration {
    pub name: String,
    pub module: String,
    pub needs_sandbox: bool,
    pub sequentiality: Sequentiality,
    pub handler: Arc<dyn Action>,
}

pub struct ActionRegistry {
    actions: HashMap<String, ActionRegistration>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder { actions: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Result<&ActionRegistration> {
        self.actions.get(name).ok_or_else(|| RuntimeError::ActionNotFound(name.to_string()))
    }

    pub fn module_of(&self, name: &str) -> Option<&str> {
        self.actions.get(name).map(|a| a.module.as_str())
    }

    /// Looks up and runs the handler for `invocation.name`, checking role
    /// permission against the action's declared module first.
    pub async fn dispatch(&self, ctx: &ActionContext, invocation: &ActionInvocation) -> Result<Value> {
        let registration = self.get(&invocation.name)?;
        if !ctx.role.allows_module(&registration.module) {
            return Err(RuntimeError::PermissionDenied {
                role: ctx.role.to_string(),
                action: invocation.name.clone(),
            });
        }
        registration.handler.execute(ctx, ActionArgs::new(invocation.arguments.clone())).await
    }

    /// Partitions invocations into (sequential, parallel) buckets in parse
    /// order, per spec.md §4.1's "sequential ones run first, then parallel
    /// ones run concurrently" edge policy. Unknown action names are treated
    /// as sequential so the dispatcher surfaces `ActionNotFound` in order.
    pub fn plan<'a>(&self, invocations: &'a [ActionInvocation]) -> (Vec<&'a ActionInvocation>, Vec<&'a ActionInvocation>) {
        let mut sequential = Vec::new();
        let mut parallel = Vec::new();
        for invocation in invocations {
            match self.actions.get(&invocation.name).map(|a| a.sequentiality) {
                Some(Sequentiality::Parallel) => parallel.push(invocation),
                _ => sequential.push(invocation),
            }
        }
        (sequential, parallel)
    }
}

pub struct ActionRegistryBuilder {
    actions: HashMap<String, ActionRegistration>,
}

impl ActionRegistryBuilder {
    pub fn register(
        mut self,
        name: impl Into<String>,
        module: impl Into<String>,
        needs_sandbox: bool,
        sequentiality: Sequentiality,
        handler: Arc<dyn Action>,
    ) -> Self {
        let name = name.into();
        self.actions.insert(
            name.clone(),
            ActionRegistration { name, module: module.into(), needs_sandbox, sequentiality, handler },
        );
        self
    }

    pub fn build(self) -> Arc<ActionRegistry> {
        Arc::new(ActionRegistry { actions: self.actions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Action for Echo {
        async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
            Ok(json!({"echo": args.string("text")?}))
        }
    }

    fn ctx() -> ActionContext {
        ActionContext { agent_id: AgentId::new(), role: Role::FullAccess }
    }

    fn registry() -> Arc<ActionRegistry> {
        ActionRegistry::builder()
            .register("notes.create", "notes", false, Sequentiality::Parallel, Arc::new(Echo))
            .register("terminal.run", "terminal", true, Sequentiality::Sequential, Arc::new(Echo))
            .build()
    }

    #[test]
    fn unknown_action_errors_with_action_not_found() {
        let registry = registry();
        assert!(matches!(registry.get("nope"), Err(RuntimeError::ActionNotFound(_))));
    }

    #[test]
    fn plan_partitions_by_declared_sequentiality_preserving_order() {
        let registry = registry();
        let invocations = vec![
            ActionInvocation::new("terminal.run"),
            ActionInvocation::new("notes.create"),
            ActionInvocation::new("terminal.run"),
        ];
        let (sequential, parallel) = registry.plan(&invocations);
        assert_eq!(sequential.len(), 2);
        assert_eq!(parallel.len(), 1);
    }

    #[tokio::test]
    async fn missing_required_argument_is_a_coercion_error() {
        let mut values = HashMap::new();
        values.insert("other".to_string(), json!("x"));
        let args = ActionArgs::new(values);
        assert!(matches!(args.string("text"), Err(RuntimeError::ArgumentCoercion { .. })));
    }

    #[tokio::test]
    async fn dispatch_denies_role_without_module_access() {
        let registry = registry();
        let mut invocation = ActionInvocation::new("terminal.run");
        invocation.arguments.insert("text".to_string(), json!("hi"));
        let restricted = ActionContext { agent_id: AgentId::new(), role: Role::Coordinator };
        let result = registry.dispatch(&restricted, &invocation).await;
        assert!(matches!(result, Err(RuntimeError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn dispatch_runs_handler_when_role_allows_module() {
        let registry = registry();
        let mut invocation = ActionInvocation::new("notes.create");
        invocation.arguments.insert("text".to_string(), json!("hi"));
        let result = registry.dispatch(&ctx(), &invocation).await.unwrap();
        assert_eq!(result, json!({"echo": "hi"}));
    }
}
