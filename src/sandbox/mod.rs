//! Sandbox Dispatcher: isolated tool execution for agents, addressable
//! either in-process (a supervised `tokio::task` per agent) or over the
//! bearer-authenticated HTTP surface in [`rpc`] for an out-of-process
//! worker.

pub mod dispatcher;
pub mod process;
pub mod rpc;
pub mod worker;

pub use dispatcher::{SandboxDispatcher, SandboxDispatcherConfig, SandboxHandle};
pub use process::ProcessToolExecutor;
pub use worker::{ToolExecutionRequest, ToolExecutionResponse, ToolExecutor};
