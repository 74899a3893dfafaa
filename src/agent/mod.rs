//! The Agent Runtime: per-agent state, the arena of live agents, role-based
//! permissions, and the action-invocation parser.

pub mod arena;
pub mod parser;
pub mod roles;
pub mod runtime;
pub mod state;

pub use arena::AgentArena;
pub use roles::Role;
pub use runtime::{AgentRuntime, RuntimeBuilder};
pub use state::{AgentState, AgentStatus};
