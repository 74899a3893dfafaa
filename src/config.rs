//! Runtime configuration.
//!
//! Loaded with the `config` crate layered over `dotenvy`-sourced
//! environment variables: built-in defaults first, then an `Environment`
//! source with prefix `AGENT_RUNTIME` so every option in this struct can be
//! overridden as `AGENT_RUNTIME_MAX_ITERATIONS`, `AGENT_RUNTIME_CACHE_TTL_SECONDS`,
//! etc. A value that fails to parse is a configuration error, not a silent
//! fallback — only fields with no testable invariant get `unwrap_or` style
//! defaults, and even those go through this same loader so there is one
//! place that decides what "default" means.

use crate::constants::*;
use crate::{Result, RuntimeError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub max_concurrent_thinker_requests: u32,
    pub min_inter_request_delay_seconds: f64,
    pub thinker_timeout_seconds: u64,

    pub cache_enabled: bool,
    pub cache_max_size: usize,
    pub cache_ttl_seconds: f64,

    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout_seconds: f64,

    pub max_iterations: u32,
    pub max_wait_seconds: u64,

    pub sandbox_request_timeout_seconds: u64,
    pub sandbox_response_timeout_seconds: u64,

    pub streaming_enabled: bool,
    /// Models whose names match one of these patterns never stream, even
    /// when `streaming_enabled` is true (substring match against the model
    /// name, case-insensitive — a regex-per-pattern would be overkill for
    /// the short opt-out lists this is meant to hold).
    pub streaming_opt_out_patterns: Vec<String>,

    /// Base URL of the external thinker (reasoning) service.
    pub thinker_base_url: String,
    /// Bearer credential for the thinker service. Never logged or
    /// serialized back out in Debug output for any type that embeds it.
    pub thinker_api_key: String,
    pub thinker_model: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_thinker_requests: DEFAULT_MAX_CONCURRENT_THINKER_REQUESTS,
            min_inter_request_delay_seconds: DEFAULT_MIN_INTER_REQUEST_DELAY_SECONDS,
            thinker_timeout_seconds: DEFAULT_THINKER_TIMEOUT_SECONDS,
            cache_enabled: DEFAULT_CACHE_ENABLED,
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            circuit_failure_threshold: DEFAULT_CIRCUIT_FAILURE_THRESHOLD,
            circuit_recovery_timeout_seconds: DEFAULT_CIRCUIT_RECOVERY_TIMEOUT_SECONDS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_wait_seconds: DEFAULT_MAX_WAIT_SECONDS,
            sandbox_request_timeout_seconds: DEFAULT_SANDBOX_REQUEST_TIMEOUT_SECONDS,
            sandbox_response_timeout_seconds: DEFAULT_SANDBOX_RESPONSE_TIMEOUT_SECONDS,
            streaming_enabled: DEFAULT_STREAMING_ENABLED,
            streaming_opt_out_patterns: Vec::new(),
            thinker_base_url: String::new(),
            thinker_api_key: String::new(),
            thinker_model: String::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the process environment (via `.env` if
    /// present), layered over the defaults above.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {e}"),
        }

        let defaults = Self::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(
                config::Environment::with_prefix("AGENT_RUNTIME")
                    .separator("__")
                    .try_parsing(true),
            );

        let built = builder.build()?;
        let mut cfg: RuntimeConfig = built.try_deserialize()?;

        if cfg.thinker_base_url.is_empty() {
            cfg.thinker_base_url = std::env::var("THINKER_BASE_URL").unwrap_or_default();
        }
        if cfg.thinker_api_key.is_empty() {
            cfg.thinker_api_key = std::env::var("THINKER_API_KEY").unwrap_or_default();
        }
        if cfg.thinker_model.is_empty() {
            cfg.thinker_model =
                std::env::var("THINKER_MODEL").unwrap_or_else(|_| "default-thinker".to_string());
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(RuntimeError::Configuration(
                "max_iterations must be greater than zero".to_string(),
            ));
        }
        if self.cache_max_size == 0 {
            return Err(RuntimeError::Configuration(
                "cache_max_size must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_thinker_requests == 0 {
            return Err(RuntimeError::Configuration(
                "max_concurrent_thinker_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `model` is opted out of streaming regardless of
    /// `streaming_enabled` (spec: "Streaming is disabled for models whose
    /// names match a configured opt-out pattern list").
    pub fn streaming_disabled_for_model(&self, model: &str) -> bool {
        let model_lower = model.to_lowercase();
        self.streaming_opt_out_patterns
            .iter()
            .any(|pattern| model_lower.contains(&pattern.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(cfg.cache_max_size, DEFAULT_CACHE_MAX_SIZE);
        assert!(cfg.streaming_enabled);
    }

    #[test]
    fn streaming_opt_out_matches_substring_case_insensitively() {
        let mut cfg = RuntimeConfig::default();
        cfg.streaming_opt_out_patterns = vec!["no-stream".to_string()];
        assert!(cfg.streaming_disabled_for_model("thinker-NO-STREAM-v2"));
        assert!(!cfg.streaming_disabled_for_model("thinker-v2"));
    }

    #[test]
    fn rejects_zero_max_iterations() {
        let mut cfg = RuntimeConfig::default();
        cfg.max_iterations = 0;
        assert!(cfg.validate().is_err());
    }
}
