use thiserror::Error;

/// Convenience alias for results produced anywhere in the runtime.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced across the agent runtime.
///
/// Every variant here corresponds to one of the error kinds the runtime is
/// contractually allowed to produce. Nothing in this crate panics its way
/// out of a boundary condition; every fallible path returns one of these.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("thinker request failed and was exhausted: {0}")]
    TransientThinker(String),

    #[error("thinker request failed non-retryably: {0}")]
    NonRetryableThinker(String),

    #[error("circuit open, retry after {retry_after_secs:.1}s")]
    CircuitOpen { retry_after_secs: f64 },

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("argument coercion failed for '{argument}': {message}")]
    ArgumentCoercion { argument: String, message: String },

    #[error("permission denied: role '{role}' may not invoke '{action}'")]
    PermissionDenied { role: String, action: String },

    #[error("sandbox response timed out after {0:.1}s")]
    SandboxTimeout(f64),

    #[error("sandbox worker died mid-request")]
    SandboxWorkerDied,

    #[error("agent {agent_id} exceeded max_iterations ({max_iterations})")]
    MaxIterationsExceeded { agent_id: String, max_iterations: u32 },

    #[error("agent {agent_id} exceeded max_wait_seconds ({max_wait_seconds})")]
    WaitTimeoutExceeded { agent_id: String, max_wait_seconds: u64 },

    #[error("invalid plan transition: {0}")]
    InvalidPlanTransition(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("configuration error: {0}")]
    ConfigLayer(#[from] config::ConfigError),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RuntimeError {
    /// True for errors the Thinker Client's retry envelope should retry.
    pub fn is_retryable_thinker_error(&self) -> bool {
        matches!(self, RuntimeError::TransientThinker(_))
    }
}
