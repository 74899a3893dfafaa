//! `AgentState`: the data-only record of a single agent's progress.
//!
//! A direct port of `original_source/strix/agents/state.py`'s `AgentState` —
//! same fields, same invariants, same status machine — restated as a plain
//! Rust struct with explicit mutators instead of Pydantic defaults.

use crate::agent::roles::Role;
use crate::models::Message;
use crate::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    WaitingForMessage,
    WaitingForRecovery,
    Completed,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub action: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub observation: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub role: Role,
    pub parent_id: Option<AgentId>,

    pub task: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub max_wait_seconds: u64,

    pub status: AgentStatus,
    pub waiting_start_time: Option<DateTime<Utc>>,
    pub final_result: Option<Value>,
    pub failure_reason: Option<String>,
    pub max_iterations_warning_sent: bool,
    pub consecutive_empty_responses: u32,

    pub messages: Vec<Message>,
    pub context: HashMap<String, Value>,

    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    pub actions_taken: Vec<ActionRecord>,
    pub observations: Vec<ObservationRecord>,
    pub errors: Vec<String>,
}

impl AgentState {
    pub fn new(role: Role, task: String, max_iterations: u32, max_wait_seconds: u64) -> Self {
        let now = Utc::now();
        Self {
            agent_id: AgentId::new(),
            agent_name: format!("{role} agent"),
            role,
            parent_id: None,
            task,
            iteration: 0,
            max_iterations,
            max_wait_seconds,
            status: AgentStatus::Running,
            waiting_start_time: None,
            final_result: None,
            failure_reason: None,
            max_iterations_warning_sent: false,
            consecutive_empty_responses: 0,
            messages: Vec::new(),
            context: HashMap::new(),
            start_time: now,
            last_updated: now,
            actions_taken: Vec::new(),
            observations: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn child(role: Role, task: String, parent: &AgentState) -> Self {
        let mut state = Self::new(role, task, parent.max_iterations, parent.max_wait_seconds);
        state.parent_id = Some(parent.agent_id.clone());
        state
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn increment_iteration(&mut self) {
        self.iteration += 1;
        self.touch();
    }

    pub fn add_message(&mut self, message: Message) {
        if message.is_empty_content() {
            self.consecutive_empty_responses += 1;
        } else {
            self.consecutive_empty_responses = 0;
        }
        self.messages.push(message);
        self.touch();
    }

    pub fn add_action(&mut self, action: Value) {
        self.actions_taken.push(ActionRecord { iteration: self.iteration, timestamp: Utc::now(), action });
    }

    pub fn add_observation(&mut self, observation: Value) {
        self.observations.push(ObservationRecord {
            iteration: self.iteration,
            timestamp: Utc::now(),
            observation,
        });
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(format!("Iteration {}: {}", self.iteration, error.into()));
        self.touch();
    }

    pub fn update_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
        self.touch();
    }

    pub fn set_completed(&mut self, final_result: Option<Value>) {
        self.status = AgentStatus::Completed;
        self.final_result = final_result;
        self.waiting_start_time = None;
        self.touch();
    }

    pub fn set_failed(&mut self, reason: impl Into<String>) {
        self.status = AgentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.waiting_start_time = None;
        self.touch();
    }

    pub fn request_stop(&mut self) {
        self.status = AgentStatus::Stopped;
        self.waiting_start_time = None;
        self.touch();
    }

    pub fn should_stop(&self) -> bool {
        matches!(self.status, AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Stopped)
            || self.has_reached_max_iterations()
    }

    pub fn is_waiting_for_input(&self) -> bool {
        matches!(self.status, AgentStatus::WaitingForMessage | AgentStatus::WaitingForRecovery)
    }

    pub fn enter_waiting_state(&mut self, llm_failed: bool) {
        self.status = if llm_failed { AgentStatus::WaitingForRecovery } else { AgentStatus::WaitingForMessage };
        self.waiting_start_time = Some(Utc::now());
        self.touch();
    }

    pub fn resume_from_waiting(&mut self, new_task: Option<String>) {
        self.status = AgentStatus::Running;
        self.waiting_start_time = None;
        self.failure_reason = None;
        self.consecutive_empty_responses = 0;
        if let Some(task) = new_task {
            self.task = task;
        }
        self.touch();
    }

    pub fn has_reached_max_iterations(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub fn is_approaching_max_iterations(&self, threshold: f64) -> bool {
        self.iteration >= (self.max_iterations as f64 * threshold) as u32
    }

    pub fn has_waiting_timeout(&self) -> bool {
        if !self.is_waiting_for_input() {
            return false;
        }
        match self.waiting_start_time {
            None => false,
            Some(started) => {
                let elapsed = (Utc::now() - started).num_seconds().max(0) as u64;
                elapsed > self.max_wait_seconds
            }
        }
    }

    pub fn has_empty_last_messages(&self, count: usize) -> bool {
        if self.messages.len() < count {
            return false;
        }
        self.messages[self.messages.len() - count..].iter().all(Message::is_empty_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AgentState {
        AgentState::new(Role::VulnerabilityTester, "find bugs".to_string(), 10, 300)
    }

    #[test]
    fn starts_running_with_zero_iterations() {
        let s = state();
        assert_eq!(s.status, AgentStatus::Running);
        assert_eq!(s.iteration, 0);
    }

    #[test]
    fn max_iterations_triggers_should_stop() {
        let mut s = state();
        for _ in 0..10 {
            s.increment_iteration();
        }
        assert!(s.has_reached_max_iterations());
        assert!(s.should_stop());
    }

    #[test]
    fn empty_message_increments_counter_nonempty_resets() {
        let mut s = state();
        s.add_message(Message::assistant(""));
        s.add_message(Message::assistant(""));
        assert_eq!(s.consecutive_empty_responses, 2);
        s.add_message(Message::assistant("hi"));
        assert_eq!(s.consecutive_empty_responses, 0);
    }

    #[test]
    fn child_inherits_parent_limits_and_records_parent_id() {
        let parent = state();
        let child = AgentState::child(Role::Reconnaissance, "recon".to_string(), &parent);
        assert_eq!(child.parent_id, Some(parent.agent_id));
        assert_eq!(child.max_iterations, parent.max_iterations);
    }

    #[test]
    fn waiting_timeout_respects_max_wait_seconds() {
        let mut s = state();
        s.enter_waiting_state(false);
        s.waiting_start_time = Some(Utc::now() - chrono::Duration::seconds(301));
        assert!(s.has_waiting_timeout());
    }
}
