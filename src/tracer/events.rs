//! `TracerEvent`: the append-only unit of the event stream.

use crate::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ScanStart,
    ScanEnd,
    AgentCreated,
    AgentStateTransition,
    AgentIteration,
    ThinkerRequest,
    ThinkerResponse,
    ThinkerError,
    ActionStart,
    ActionEnd,
    ActionError,
    AgentMessageSent,
    AgentMessageReceived,
    VulnerabilityFound,
    ProgressUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerEvent {
    pub event_id: u64,
    pub event_type: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

pub struct EventBuilder {
    event_type: EventKind,
    agent_id: Option<AgentId>,
    data: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl EventBuilder {
    pub fn new(event_type: EventKind) -> Self {
        Self { event_type, agent_id: None, data: Map::new(), metadata: Map::new() }
    }

    pub fn agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn build(self, event_id: u64) -> TracerEvent {
        TracerEvent {
            event_id,
            event_type: self.event_type,
            timestamp: Utc::now(),
            agent_id: self.agent_id,
            data: self.data,
            metadata: self.metadata,
        }
    }
}
