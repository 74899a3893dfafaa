//! Core data types shared across the runtime: conversation messages, action
//! invocations, and severity levels for reported findings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Opaque identifier for a single agent instance.
///
/// Agents are addressed by id everywhere (the tracer, the sandbox
/// dispatcher, the arena) rather than through a live reference, so an
/// agent's parent and children are just ids it carries, never a pointer
/// back into the arena that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new() -> Self {
        Self(format!("agent_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role of a single turn in a conversation sent to the thinker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a dispatched action, fed back as the next turn's input.
    Tool,
}

/// One turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into() }
    }

    /// True when this message carries no meaningful text, as tracked by
    /// the agent runtime's consecutive-empty-response counter.
    pub fn is_empty_content(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A single action call parsed out of a thinker response.
///
/// `arguments` stays as a raw `serde_json::Value` map: the action registry
/// is responsible for coercing each argument to the shape its handler
/// expects, not this parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
}

impl ActionInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), arguments: HashMap::new() }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    pub fn string_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Severity of a reported finding, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_has_agent_prefix_and_short_suffix() {
        let id = AgentId::new();
        assert!(id.0.starts_with("agent_"));
        assert_eq!(id.0.len(), "agent_".len() + 8);
    }

    #[test]
    fn severity_orders_info_below_critical() {
        assert!(Severity::Info < Severity::Critical);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn empty_content_detection_ignores_whitespace() {
        let msg = Message::assistant("   \n  ");
        assert!(msg.is_empty_content());
        let msg = Message::assistant("ok");
        assert!(!msg.is_empty_content());
    }
}
