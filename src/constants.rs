//! System-wide default values.
//!
//! Every constant here is also a recognized configuration option (see
//! [`crate::config`]) — the value below is only the default applied when
//! the environment does not override it.

// --- Thinker Client ---
pub const DEFAULT_MAX_CONCURRENT_THINKER_REQUESTS: u32 = 6;
pub const DEFAULT_MIN_INTER_REQUEST_DELAY_SECONDS: f64 = 1.0;
pub const DEFAULT_THINKER_TIMEOUT_SECONDS: u64 = 600;
pub const THINKER_RETRY_ATTEMPTS: u32 = 3;
pub const THINKER_RETRY_BASE_BACKOFF_SECONDS: u64 = 2;
pub const THINKER_RETRY_MAX_BACKOFF_SECONDS: u64 = 16;

// --- Response Cache ---
pub const DEFAULT_CACHE_ENABLED: bool = true;
pub const DEFAULT_CACHE_MAX_SIZE: usize = 100;
pub const DEFAULT_CACHE_TTL_SECONDS: f64 = 3600.0;

// --- Circuit Breaker ---
pub const DEFAULT_CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_CIRCUIT_RECOVERY_TIMEOUT_SECONDS: f64 = 60.0;
pub const CIRCUIT_HALF_OPEN_MAX_CALLS: u32 = 1;

// --- Agent Runtime ---
pub const DEFAULT_MAX_ITERATIONS: u32 = 300;
pub const DEFAULT_MAX_WAIT_SECONDS: u64 = 300;
pub const CONSECUTIVE_EMPTY_RESPONSE_WARNING: u32 = 3;
pub const CONSECUTIVE_EMPTY_RESPONSE_LIMIT: u32 = 5;
pub const PARALLEL_ACTION_CONCURRENCY: usize = 4;

// --- Sandbox Dispatcher ---
pub const DEFAULT_SANDBOX_REQUEST_TIMEOUT_SECONDS: u64 = 120;
pub const DEFAULT_SANDBOX_RESPONSE_TIMEOUT_SECONDS: u64 = 180;
pub const SANDBOX_WORKER_FAILURE_RESTART_THRESHOLD: u32 = 5;

// --- Memory Compactor ---
pub const DEFAULT_COMPACTION_KEEP_LAST: usize = 20;
pub const MAX_CACHE_MARKERS: usize = 3;

// --- Reconciler ---
pub const RECONCILER_STALE_WAIT_SECONDS: i64 = 300;
pub const RECONCILER_LOOP_WINDOW_MESSAGES: usize = 6;
pub const RECONCILER_LOOP_REPEAT_THRESHOLD: usize = 3;
pub const RECONCILER_LOOP_PREFIX_LEN: usize = 100;
pub const RECONCILER_RATE_LIMIT_ERROR_THRESHOLD: usize = 3;

// --- Streaming ---
pub const DEFAULT_STREAMING_ENABLED: bool = true;

// --- Run directory ---
pub const RUNS_ROOT_DIR: &str = "agent_runs";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const METADATA_FILE: &str = "metadata.json";
pub const RUN_STATE_FILE: &str = "run_state.json";
pub const RUN_PLAN_FILE: &str = "run_plan.json";
pub const REPORT_FILE: &str = "penetration_test_report.md";
pub const VULNERABILITIES_DIR: &str = "vulnerabilities";
pub const VULNERABILITIES_INDEX_FILE: &str = "vulnerabilities.csv";
pub const NOTES_FILE: &str = "notes.json";
pub const PROGRESS_FILE: &str = "progress.json";
pub const LLM_RESPONSES_DIR: &str = "llm_responses";
