//! Thinker Client: the pipeline that turns a conversation into a thinker
//! response, guarded by a response cache, a bounded/rate-limited request
//! queue, a circuit breaker, and a bounded retry envelope.
//!
//! Grounded in `original_source/strix/llm/llm.py`'s request pipeline and the
//! teacher's `claude_code::circuit_breaker`; none of the three collaborators
//! are process-wide singletons (`strix`'s `get_global_cache()` /
//! `get_global_queue()` pattern is the thing spec.md §9 asks this crate to
//! fix) — each `ThinkerClient` owns its own.

pub mod cache;
pub mod circuit_breaker;
pub mod http;
pub mod queue;

use crate::constants::{THINKER_RETRY_ATTEMPTS, THINKER_RETRY_BASE_BACKOFF_SECONDS, THINKER_RETRY_MAX_BACKOFF_SECONDS};
use crate::models::Message;
use crate::{RuntimeConfig, RuntimeError};
use cache::ResponseCache;
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use http::{Thinker, ThinkerRequest, TokenUsage};
use queue::RequestQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct UsageTotals {
    pub input_tokens: AtomicU64,
    pub output_tokens: AtomicU64,
    pub cached_tokens: AtomicU64,
    pub requests: AtomicU64,
    pub cache_hits: AtomicU64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub requests: u64,
    pub cache_hits: u64,
}

impl UsageTotals {
    fn record(&self, usage: TokenUsage) {
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::Relaxed);
        self.cached_tokens.fetch_add(usage.cached_tokens, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            cached_tokens: self.cached_tokens.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Merge another agent's usage into this one (subtree rollup).
    pub fn merge(&self, other: &UsageSnapshot) {
        self.input_tokens.fetch_add(other.input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(other.output_tokens, Ordering::Relaxed);
        self.cached_tokens.fetch_add(other.cached_tokens, Ordering::Relaxed);
        self.requests.fetch_add(other.requests, Ordering::Relaxed);
        self.cache_hits.fetch_add(other.cache_hits, Ordering::Relaxed);
    }
}

pub struct ThinkerClient {
    thinker: Arc<dyn Thinker>,
    cache: ResponseCache,
    queue: RequestQueue,
    breaker: Arc<CircuitBreaker>,
    model: String,
    streaming_enabled: bool,
    usage: UsageTotals,
}

impl ThinkerClient {
    pub fn new(config: &RuntimeConfig, thinker: Arc<dyn Thinker>) -> Self {
        Self {
            thinker,
            cache: ResponseCache::new(config.cache_enabled, config.cache_max_size, config.cache_ttl_seconds),
            queue: RequestQueue::new(
                config.max_concurrent_thinker_requests,
                config.min_inter_request_delay_seconds,
            ),
            breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: config.circuit_failure_threshold,
                recovery_timeout: std::time::Duration::from_secs_f64(
                    config.circuit_recovery_timeout_seconds,
                ),
                half_open_max_calls: crate::constants::CIRCUIT_HALF_OPEN_MAX_CALLS,
                name: "thinker".to_string(),
            })),
            model: config.thinker_model.clone(),
            streaming_enabled: config.streaming_enabled
                && !config.streaming_disabled_for_model(&config.thinker_model),
            usage: UsageTotals::default(),
        }
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    pub async fn circuit_state(&self) -> circuit_breaker::CircuitState {
        self.breaker.state().await
    }

    pub async fn circuit_stats(&self) -> circuit_breaker::CircuitBreakerStats {
        self.breaker.stats().await
    }

    /// Run the conversation through cache -> circuit breaker -> rate-limited
    /// queue -> bounded retry, returning the response text.
    pub async fn generate(&self, messages: &[Message]) -> crate::Result<String> {
        if let Some(cached) = self.cache.get(&self.model, messages).await {
            self.usage.record_cache_hit();
            debug!("thinker cache hit");
            return Ok(cached);
        }

        self.breaker.check().await.map_err(|e| RuntimeError::CircuitOpen {
            retry_after_secs: e.retry_after_secs,
        })?;

        let mut attempt = 0u32;
        let mut backoff = THINKER_RETRY_BASE_BACKOFF_SECONDS;
        loop {
            attempt += 1;
            let permit = self.queue.acquire().await;
            let request = ThinkerRequest {
                model: self.model.clone(),
                messages: messages.to_vec(),
                stream: self.streaming_enabled,
            };

            match self.thinker.complete(request).await {
                Ok(response) => {
                    permit.success();
                    self.breaker.record_success().await;
                    self.usage.record(response.usage);
                    self.cache.put(&self.model, messages, response.content.clone()).await;
                    return Ok(response.content);
                }
                Err(e) if e.retryable && attempt < THINKER_RETRY_ATTEMPTS => {
                    permit.failure();
                    self.breaker.record_failure().await;
                    warn!(attempt, error = %e.message, "thinker request failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(THINKER_RETRY_MAX_BACKOFF_SECONDS);
                }
                Err(e) if e.retryable => {
                    permit.failure();
                    self.breaker.record_failure().await;
                    return Err(RuntimeError::TransientThinker(e.message));
                }
                Err(e) => {
                    permit.failure();
                    self.breaker.record_failure().await;
                    return Err(RuntimeError::NonRetryableThinker(e.message));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::{ThinkerRawResponse, ThinkerTransportError};
    use std::sync::atomic::AtomicUsize;

    struct FlakyThinker {
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Thinker for FlakyThinker {
        async fn complete(
            &self,
            _request: ThinkerRequest,
        ) -> Result<ThinkerRawResponse, ThinkerTransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(ThinkerTransportError::retryable("503"))
            } else {
                Ok(ThinkerRawResponse { content: "ok".to_string(), usage: TokenUsage::default() })
            }
        }
    }

    fn test_config() -> RuntimeConfig {
        let mut cfg = RuntimeConfig::default();
        cfg.thinker_model = "test-model".to_string();
        cfg
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let thinker = Arc::new(FlakyThinker { failures_before_success: 1, calls: AtomicUsize::new(0) });
        let client = ThinkerClient::new(&test_config(), thinker);
        let result = client.generate(&[Message::user("hi")]).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn caches_identical_requests() {
        let thinker = Arc::new(FlakyThinker { failures_before_success: 0, calls: AtomicUsize::new(0) });
        let client = ThinkerClient::new(&test_config(), thinker.clone());
        let messages = vec![Message::user("hi")];
        client.generate(&messages).await.unwrap();
        client.generate(&messages).await.unwrap();
        assert_eq!(thinker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.usage().cache_hits, 1);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_transient_error() {
        let thinker = Arc::new(FlakyThinker { failures_before_success: 99, calls: AtomicUsize::new(0) });
        let client = ThinkerClient::new(&test_config(), thinker);
        let err = client.generate(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::TransientThinker(_)));
    }
}
