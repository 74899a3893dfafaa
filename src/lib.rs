//! Runtime for fleets of autonomous agents that drive an external
//! reasoning service ("the thinker") through iterations, dispatch parsed
//! actions to sandboxed workers, and persist a durable, resumable trail of
//! everything that happened along the way.

pub mod actions;
pub mod agent;
pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod models;
pub mod monitoring;
pub mod notes;
pub mod persistence;
pub mod plan;
pub mod progress;
pub mod reconciler;
pub mod run;
pub mod sandbox;
pub mod thinker;
pub mod tracer;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use models::{ActionInvocation, AgentId, Message, Role, Severity};
