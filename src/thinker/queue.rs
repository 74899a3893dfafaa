//! Bounded-concurrency, rate-limited request queue in front of the
//! thinker endpoint.
//!
//! Ported from `llm/request_queue.py`'s `LLMRequestQueue`: a semaphore
//! caps concurrent in-flight requests, and a minimum inter-request delay
//! is enforced directly rather than via Python's coarse polling loop — the
//! direct (unkeyed) `governor::RateLimiter` used here is the same crate and
//! pattern as the teacher's `rate_limit::RateLimitConfig`, generalized from
//! per-IP keyed limiting to a single global quota for the thinker endpoint.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

#[derive(Debug, Default)]
pub struct QueueStats {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub rate_limited_waits: AtomicU64,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        QueueStatsSnapshot {
            total_requests: total,
            successful_requests: successful,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            rate_limited_waits: self.rate_limited_waits.load(Ordering::Relaxed),
            success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 * 100.0 },
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_waits: u64,
    pub success_rate: f64,
}

/// A held slot in the request queue. Dropping it releases the concurrency
/// permit; callers mark `success()`/`failure()` before dropping so the
/// queue's stats stay accurate.
pub struct QueuePermit<'a> {
    queue: &'a RequestQueue,
    resolved: bool,
    _permit: tokio::sync::SemaphorePermit<'a>,
}

impl<'a> QueuePermit<'a> {
    pub fn success(mut self) {
        self.queue.stats.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.resolved = true;
    }

    pub fn failure(mut self) {
        self.queue.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.resolved = true;
    }
}

impl Drop for QueuePermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.queue.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub struct RequestQueue {
    semaphore: Semaphore,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    stats: QueueStats,
}

impl RequestQueue {
    pub fn new(max_concurrent: u32, min_inter_request_delay_seconds: f64) -> Self {
        let period = std::time::Duration::from_secs_f64(min_inter_request_delay_seconds.max(0.001));
        let quota = Quota::with_period(period)
            .expect("min_inter_request_delay_seconds must be positive")
            .allow_burst(NonZeroU32::new(1).expect("1 is nonzero"));
        Self {
            semaphore: Semaphore::new(max_concurrent.max(1) as usize),
            limiter: Arc::new(RateLimiter::direct(quota)),
            stats: QueueStats::default(),
        }
    }

    /// Acquire a slot: blocks until both a concurrency permit is free and
    /// the minimum inter-request spacing has elapsed.
    pub async fn acquire(&self) -> QueuePermit<'_> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let permit = self.semaphore.acquire().await.expect("semaphore never closed");

        if self.limiter.check().is_err() {
            self.stats.rate_limited_waits.fetch_add(1, Ordering::Relaxed);
            info!("thinker request queue throttling to respect minimum inter-request delay");
            self.limiter.until_ready().await;
        }

        QueuePermit { queue: self, resolved: false, _permit: permit }
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_then_success_updates_stats() {
        let queue = RequestQueue::new(2, 0.001);
        let permit = queue.acquire().await;
        permit.success();
        let stats = queue.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.successful_requests, 1);
    }

    #[tokio::test]
    async fn dropped_permit_without_resolution_counts_as_failure() {
        let queue = RequestQueue::new(1, 0.001);
        {
            let _permit = queue.acquire().await;
        }
        let stats = queue.stats();
        assert_eq!(stats.failed_requests, 1);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let queue = Arc::new(RequestQueue::new(1, 0.0));
        let first = queue.acquire().await;
        let second_fut = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let _p = queue.acquire().await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!second_fut.is_finished());
        first.success();
        second_fut.await.unwrap();
    }
}
