//! `AgentArena`: the shared registry of every live agent in a run.
//!
//! Agents never hold a reference to another agent, only an [`AgentId`] —
//! matching `state.py`'s flat id-based design and spec.md §9's "arena of
//! agents indexed by agent_id" guidance. Inter-agent messaging goes through
//! the arena's mailbox rather than a direct channel between two agents.

use crate::agent::state::{AgentState, AgentStatus};
use crate::models::Message;
use crate::{AgentId, Result, RuntimeError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
pub struct AgentArena {
    agents: RwLock<HashMap<AgentId, Arc<Mutex<AgentState>>>>,
    mailboxes: RwLock<HashMap<AgentId, Vec<Message>>>,
}

impl AgentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, state: AgentState) -> AgentId {
        let id = state.agent_id.clone();
        self.agents.write().await.insert(id.clone(), Arc::new(Mutex::new(state)));
        id
    }

    pub async fn get(&self, id: &AgentId) -> Result<Arc<Mutex<AgentState>>> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownAgent(id.to_string()))
    }

    pub async fn remove(&self, id: &AgentId) -> Option<Arc<Mutex<AgentState>>> {
        self.agents.write().await.remove(id)
    }

    pub async fn children_of(&self, parent: &AgentId) -> Vec<AgentId> {
        let mut children = Vec::new();
        for (id, state) in self.agents.read().await.iter() {
            if state.lock().await.parent_id.as_ref() == Some(parent) {
                children.push(id.clone());
            }
        }
        children
    }

    pub async fn all_ids(&self) -> Vec<AgentId> {
        self.agents.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Tally of agents per [`AgentStatus`], for health/metrics reporting.
    pub async fn status_counts(&self) -> HashMap<AgentStatus, usize> {
        let mut counts = HashMap::new();
        for state in self.agents.read().await.values() {
            *counts.entry(state.lock().await.status).or_insert(0) += 1;
        }
        counts
    }

    /// Deposits a message in `recipient`'s mailbox for it to drain on its
    /// next iteration boundary, rather than delivering synchronously into a
    /// possibly-mid-iteration agent.
    pub async fn send_message(&self, recipient: &AgentId, message: Message) -> Result<()> {
        if !self.agents.read().await.contains_key(recipient) {
            return Err(RuntimeError::UnknownAgent(recipient.to_string()));
        }
        self.mailboxes.write().await.entry(recipient.clone()).or_default().push(message);
        Ok(())
    }

    /// Drains and returns every pending message for `agent_id`.
    pub async fn drain_mailbox(&self, agent_id: &AgentId) -> Vec<Message> {
        self.mailboxes.write().await.remove(agent_id).unwrap_or_default()
    }

    pub async fn has_pending_messages(&self, agent_id: &AgentId) -> bool {
        self.mailboxes.read().await.get(agent_id).is_some_and(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::roles::Role;

    fn state() -> AgentState {
        AgentState::new(Role::Reconnaissance, "task".to_string(), 10, 60)
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let arena = AgentArena::new();
        let id = arena.insert(state()).await;
        assert!(arena.get(&id).await.is_ok());
    }

    #[tokio::test]
    async fn get_unknown_agent_errors() {
        let arena = AgentArena::new();
        let result = arena.get(&AgentId::from("agent_ffffffff")).await;
        assert!(matches!(result, Err(RuntimeError::UnknownAgent(_))));
    }

    #[tokio::test]
    async fn children_of_filters_by_parent_id() {
        let arena = AgentArena::new();
        let parent = state();
        let parent_id = parent.agent_id.clone();
        arena.insert(parent).await;
        let child = AgentState::child(Role::Reconnaissance, "sub".to_string(), &{
            let mut p = state();
            p.agent_id = parent_id.clone();
            p
        });
        arena.insert(child).await;
        let children = arena.children_of(&parent_id).await;
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn mailbox_delivers_and_drains() {
        let arena = AgentArena::new();
        let id = arena.insert(state()).await;
        arena.send_message(&id, Message::user("hi")).await.unwrap();
        assert!(arena.has_pending_messages(&id).await);
        let drained = arena.drain_mailbox(&id).await;
        assert_eq!(drained.len(), 1);
        assert!(!arena.has_pending_messages(&id).await);
    }

    #[tokio::test]
    async fn status_counts_tallies_by_status() {
        let arena = AgentArena::new();
        arena.insert(state()).await;
        arena.insert(state()).await;
        let counts = arena.status_counts().await;
        assert_eq!(counts.get(&AgentStatus::Running), Some(&2));
    }

    #[tokio::test]
    async fn sending_to_unknown_agent_errors() {
        let arena = AgentArena::new();
        let result = arena.send_message(&AgentId::from("agent_ffffffff"), Message::user("hi")).await;
        assert!(result.is_err());
    }
}
