//! System Monitoring: periodic health snapshots of a running fleet.
//!
//! Grounded in the teacher's `monitoring::SystemMonitor` — a background
//! collection loop with a bounded history and a graceful shutdown channel —
//! re-pointed at this runtime's actual health signals (the thinker circuit
//! breaker, per-agent status counts, tool execution volume) instead of host
//! CPU/memory/disk, which nothing in this crate's dependency stack collects
//! and which `original_source` has no equivalent of either.

use crate::agent::runtime::AgentRuntime;
use crate::agent::state::AgentStatus;
use crate::thinker::circuit_breaker::{CircuitBreakerStats, CircuitState};
use crate::thinker::UsageSnapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetMetrics {
    pub uptime_seconds: f64,
    pub health_status: HealthStatus,
    pub circuit_breaker: CircuitBreakerStats,
    pub agent_status_counts: HashMap<AgentStatus, usize>,
    pub tool_executions_count: u64,
    pub findings_count: usize,
    pub usage: UsageSnapshot,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub collection_interval: Duration,
    pub metrics_retention_count: usize,
    /// Fraction of agents in `Failed` status (of all non-terminal-excluded
    /// agents) at or above which the fleet is considered degraded.
    pub failed_ratio_warning: f64,
    pub failed_ratio_critical: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(30),
            metrics_retention_count: 200,
            failed_ratio_warning: 0.25,
            failed_ratio_critical: 0.5,
        }
    }
}

/// Periodically snapshots [`AgentRuntime`] health into a bounded in-memory
/// history. One monitor per run; never a process-wide singleton.
pub struct HealthMonitor {
    config: MonitoringConfig,
    start_time: Instant,
    runtime: Arc<AgentRuntime>,
    history: Arc<RwLock<Vec<FleetMetrics>>>,
    current: Arc<RwLock<Option<FleetMetrics>>>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_sender: Mutex<Option<mpsc::Sender<()>>>,
}

impl HealthMonitor {
    pub fn new(runtime: Arc<AgentRuntime>, config: MonitoringConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            runtime,
            history: Arc::new(RwLock::new(Vec::new())),
            current: Arc::new(RwLock::new(None)),
            task_handle: Mutex::new(None),
            shutdown_sender: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        info!(interval_secs = self.config.collection_interval.as_secs(), "starting health monitor");

        let (shutdown_sender, mut shutdown_receiver) = mpsc::channel::<()>(1);
        *self.shutdown_sender.lock().await = Some(shutdown_sender);

        let runtime = self.runtime.clone();
        let history = self.history.clone();
        let current = self.current.clone();
        let start_time = self.start_time;
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.collection_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let metrics = collect(&runtime, start_time, &config).await;
                        *current.write().await = Some(metrics.clone());
                        let mut history = history.write().await;
                        history.push(metrics);
                        while history.len() > config.metrics_retention_count {
                            history.remove(0);
                        }
                    }
                    _ = shutdown_receiver.recv() => {
                        info!("health monitor shutting down");
                        break;
                    }
                }
            }
        });

        *self.task_handle.lock().await = Some(handle);
    }

    pub async fn shutdown(&self) {
        if let Some(sender) = self.shutdown_sender.lock().await.take() {
            let _ = sender.send(()).await;
        }
        if let Some(handle) = self.task_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "health monitor task did not shut down cleanly");
            }
        }
    }

    /// Collects a fresh snapshot immediately, independent of the background
    /// interval — used by a health HTTP endpoint that wants an up-to-date
    /// answer rather than whatever the last tick happened to capture.
    pub async fn snapshot_now(&self) -> FleetMetrics {
        collect(&self.runtime, self.start_time, &self.config).await
    }

    pub async fn current(&self) -> Option<FleetMetrics> {
        self.current.read().await.clone()
    }

    pub async fn history(&self) -> Vec<FleetMetrics> {
        self.history.read().await.clone()
    }
}

async fn collect(runtime: &Arc<AgentRuntime>, start_time: Instant, config: &MonitoringConfig) -> FleetMetrics {
    debug!("collecting fleet metrics");

    let circuit_breaker = runtime.thinker_client().circuit_stats().await;
    let agent_status_counts = runtime.arena().status_counts().await;
    let tool_executions_count = runtime.tracer().tool_executions_count();
    let findings_count = runtime.tracer().findings_count().await;
    let usage = runtime.thinker_client().usage();

    let health_status = calculate_health(&circuit_breaker, &agent_status_counts, config);

    FleetMetrics {
        uptime_seconds: start_time.elapsed().as_secs_f64(),
        health_status,
        circuit_breaker,
        agent_status_counts,
        tool_executions_count,
        findings_count,
        usage,
    }
}

fn calculate_health(
    circuit_breaker: &CircuitBreakerStats,
    agent_status_counts: &HashMap<AgentStatus, usize>,
    config: &MonitoringConfig,
) -> HealthStatus {
    let mut status = match circuit_breaker.state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded,
        CircuitState::Open => HealthStatus::Unhealthy,
    };

    let total: usize = agent_status_counts.values().sum();
    let failed = agent_status_counts.get(&AgentStatus::Failed).copied().unwrap_or(0);
    if total > 0 {
        let ratio = failed as f64 / total as f64;
        if ratio >= config.failed_ratio_critical {
            status = status.max(HealthStatus::Critical);
        } else if ratio >= config.failed_ratio_warning {
            status = status.max(HealthStatus::Degraded);
        }
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(state: CircuitState) -> CircuitBreakerStats {
        CircuitBreakerStats {
            name: "thinker".to_string(),
            state,
            failure_count: 0,
            failure_threshold: 5,
            total_calls: 0,
            total_failures: 0,
            total_circuit_breaks: 0,
        }
    }

    #[test]
    fn closed_circuit_and_no_agents_is_healthy() {
        let status = calculate_health(&stats(CircuitState::Closed), &HashMap::new(), &MonitoringConfig::default());
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn open_circuit_is_unhealthy() {
        let status = calculate_health(&stats(CircuitState::Open), &HashMap::new(), &MonitoringConfig::default());
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[test]
    fn high_failure_ratio_escalates_to_critical() {
        let mut counts = HashMap::new();
        counts.insert(AgentStatus::Failed, 9);
        counts.insert(AgentStatus::Running, 1);
        let status = calculate_health(&stats(CircuitState::Closed), &counts, &MonitoringConfig::default());
        assert_eq!(status, HealthStatus::Critical);
    }

    #[test]
    fn moderate_failure_ratio_is_degraded_not_worse_than_open_circuit_unhealthy() {
        let mut counts = HashMap::new();
        counts.insert(AgentStatus::Failed, 3);
        counts.insert(AgentStatus::Running, 7);
        let status = calculate_health(&stats(CircuitState::Open), &counts, &MonitoringConfig::default());
        assert_eq!(status, HealthStatus::Unhealthy);
    }
}
