//! Circuit breaker protecting the thinker endpoint from cascading failures.
//!
//! Semantics (single failure threshold, single half-open probe) are ported
//! from `llm/circuit_breaker.py`'s `CircuitBreaker`, restated with the
//! teacher's `Arc`/`RwLock`/`AtomicU32` concurrency style rather than a
//! `threading.Lock`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
    pub name: String,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::constants::DEFAULT_CIRCUIT_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_secs_f64(
                crate::constants::DEFAULT_CIRCUIT_RECOVERY_TIMEOUT_SECONDS,
            ),
            half_open_max_calls: crate::constants::CIRCUIT_HALF_OPEN_MAX_CALLS,
            name: "thinker".to_string(),
        }
    }
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    half_open_calls: u32,
    last_failure_time: Option<Instant>,
}

/// Thread-safe circuit breaker. One instance guards the thinker endpoint;
/// tests construct their own instances with short recovery timeouts.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_breaks: AtomicU32,
}

/// Circuit is open; callers should not retry until `retry_after` elapses.
#[derive(Debug, Clone, thiserror::Error)]
#[error("circuit breaker '{name}' is open, retry in {retry_after_secs:.1}s")]
pub struct CircuitOpenError {
    pub name: String,
    pub retry_after_secs: f64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                half_open_calls: 0,
                last_failure_time: None,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_breaks: AtomicU32::new(0),
        }
    }

    fn time_until_recovery(inner: &Inner, config: &CircuitBreakerConfig) -> f64 {
        match inner.last_failure_time {
            None => 0.0,
            Some(t) => {
                let elapsed = t.elapsed();
                (config.recovery_timeout.saturating_sub(elapsed)).as_secs_f64()
            }
        }
    }

    fn should_attempt_recovery(inner: &Inner, config: &CircuitBreakerConfig) -> bool {
        match inner.last_failure_time {
            None => true,
            Some(t) => t.elapsed() >= config.recovery_timeout,
        }
    }

    /// Promote Open -> HalfOpen if the recovery timeout has elapsed, and
    /// report the (possibly updated) state.
    pub async fn state(&self) -> CircuitState {
        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::Open && Self::should_attempt_recovery(&inner, &self.config)
        {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_calls = 0;
            info!(circuit = %self.config.name, "circuit breaker entering half-open state");
        }
        inner.state
    }

    /// Returns `Ok(())` if a call may proceed, incrementing the half-open
    /// probe counter when applicable, or `Err` with the time until retry.
    pub async fn check(&self) -> Result<(), CircuitOpenError> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state().await;

        let mut inner = self.inner.write().await;
        match state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        name: self.config.name.clone(),
                        retry_after_secs: Self::time_until_recovery(&inner, &self.config),
                    })
                }
            }
            CircuitState::Open => Err(CircuitOpenError {
                name: self.config.name.clone(),
                retry_after_secs: Self::time_until_recovery(&inner, &self.config),
            }),
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.half_open_calls = 0;
                info!(circuit = %self.config.name, "circuit breaker recovered, closing circuit");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.write().await;
        inner.last_failure_time = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                self.total_breaks.fetch_add(1, Ordering::Relaxed);
                warn!(circuit = %self.config.name, "recovery probe failed, reopening circuit");
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    self.total_breaks.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        circuit = %self.config.name,
                        failures = inner.failure_count,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.half_open_calls = 0;
        info!(circuit = %self.config.name, "circuit breaker manually reset");
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read().await;
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_circuit_breaks: self.total_breaks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_circuit_breaks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_millis(50),
            half_open_max_calls: 1,
            name: "test".to_string(),
        })
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = short_breaker(2);
        breaker.check().await.unwrap();
        breaker.record_failure().await;
        breaker.check().await.unwrap();
        breaker.record_failure().await;

        assert_eq!(breaker.state().await, CircuitState::Open);
        assert!(breaker.check().await.is_err());
    }

    #[tokio::test]
    async fn half_open_success_closes_circuit() {
        let breaker = short_breaker(1);
        breaker.check().await.unwrap();
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.check().await.unwrap();
        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let breaker = short_breaker(1);
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.check().await.unwrap();
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn success_in_closed_state_resets_failure_count() {
        let breaker = short_breaker(3);
        breaker.record_failure().await;
        breaker.record_success().await;
        let stats = breaker.stats().await;
        assert_eq!(stats.failure_count, 0);
    }
}
