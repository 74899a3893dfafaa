//! Event Tracer: the durable, ordered record of a run.
//!
//! Grounded in `original_source/strix/telemetry/tracer.py`'s event-stream
//! variant (spec.md §9 resolves the "two tracer variants" open question in
//! favor of the event-stream contract, not the legacy `chat_messages`/
//! `tool_executions` dict-of-everything shape).

pub mod events;
pub mod findings;

pub use events::{EventBuilder, EventKind, TracerEvent};
pub use findings::{Finding, FindingStore};

use crate::agent::roles::Role;
use crate::models::Severity;
use crate::persistence::atomic_write_json;
use crate::{AgentId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

pub type EventCallback = dyn Fn(&TracerEvent) + Send + Sync;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub run_name: String,
    pub start_time: DateTime<Utc>,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub run_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_complete: bool,
    pub is_continuation: bool,
    #[serde(default)]
    pub continuation_context: serde_json::Map<String, serde_json::Value>,
    pub agents_count: usize,
    pub tool_executions_count: u64,
    pub vulnerability_reports_count: usize,
    pub has_plan: bool,
}

struct Inner {
    next_event_id: u64,
    log: Vec<TracerEvent>,
    writer: Option<BufWriter<tokio::fs::File>>,
}

pub struct Tracer {
    run_dir: PathBuf,
    run_id: String,
    run_name: String,
    start_time: DateTime<Utc>,
    is_continuation: bool,
    inner: Mutex<Inner>,
    findings: FindingStore,
    subscribers: RwLock<Vec<Arc<EventCallback>>>,
    tool_executions_count: AtomicU64,
}

impl Tracer {
    pub async fn create(runs_root: impl Into<PathBuf>, run_name: String) -> Result<Self> {
        let run_dir = runs_root.into().join(&run_name);
        tokio::fs::create_dir_all(&run_dir).await?;
        tokio::fs::create_dir_all(run_dir.join(crate::constants::VULNERABILITIES_DIR)).await?;
        tokio::fs::create_dir_all(run_dir.join(crate::constants::LLM_RESPONSES_DIR)).await?;

        let events_path = run_dir.join(crate::constants::EVENTS_FILE);
        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&events_path).await?;

        let existing = load_existing_events(&events_path).await?;
        let next_event_id = existing.last().map(|e| e.event_id + 1).unwrap_or(1);

        Ok(Self {
            findings: FindingStore::new(&run_dir),
            run_dir,
            run_id: run_name.clone(),
            run_name,
            start_time: Utc::now(),
            is_continuation: !existing.is_empty(),
            inner: Mutex::new(Inner { next_event_id, log: existing, writer: Some(BufWriter::new(file)) }),
            subscribers: RwLock::new(Vec::new()),
            tool_executions_count: AtomicU64::new(0),
        })
    }

    pub fn run_dir(&self) -> &std::path::Path {
        &self.run_dir
    }

    pub fn findings(&self) -> &FindingStore {
        &self.findings
    }

    pub fn is_continuation(&self) -> bool {
        self.is_continuation
    }

    pub async fn subscribe(&self, callback: Arc<EventCallback>) {
        self.subscribers.write().await.push(callback);
    }

    /// Assigns a monotonic event_id, writes it to disk under the same lock
    /// that assigned the id, then notifies subscribers. The disk write
    /// happens before this call returns, and before any subscriber runs.
    pub async fn emit(&self, builder: EventBuilder) -> Result<TracerEvent> {
        let event = {
            let mut inner = self.inner.lock().await;
            let event_id = inner.next_event_id;
            inner.next_event_id += 1;
            let event = builder.build(event_id);

            let mut line = serde_json::to_vec(&event)?;
            line.push(b'\n');
            if let Some(writer) = inner.writer.as_mut() {
                writer.write_all(&line).await?;
                writer.flush().await?;
            }

            inner.log.push(event.clone());
            event
        };

        self.notify_subscribers(&event).await;
        Ok(event)
    }

    async fn notify_subscribers(&self, event: &TracerEvent) {
        let subscribers = self.subscribers.read().await;
        for callback in subscribers.iter() {
            let callback = callback.clone();
            let event = event.clone();
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                error!(event_id = event.event_id, "tracer subscriber panicked, suppressing");
            }
        }
    }

    /// Returns events at index ≥ `cursor` and the new high-water mark.
    pub async fn events_since(&self, cursor: u64) -> (Vec<TracerEvent>, u64) {
        let inner = self.inner.lock().await;
        let events: Vec<TracerEvent> = inner.log.iter().filter(|e| e.event_id >= cursor).cloned().collect();
        let new_cursor = inner.next_event_id;
        (events, new_cursor)
    }

    pub async fn add_finding(&self, title: String, body: String, severity: Severity) -> Result<Finding> {
        let finding = self.findings.add_finding(title.clone(), body, severity).await?;
        self.emit(
            EventBuilder::new(EventKind::VulnerabilityFound)
                .field("finding_id", finding.finding_id.clone())
                .field("title", title)
                .field("severity", severity.to_string()),
        )
        .await?;
        Ok(finding)
    }

    pub async fn log_agent_creation(&self, agent_id: AgentId, role: Role, task: &str, parent_id: Option<AgentId>) -> Result<()> {
        let mut builder = EventBuilder::new(EventKind::AgentCreated)
            .agent(agent_id)
            .field("role", role.to_string())
            .field("task", task.to_string());
        if let Some(parent) = parent_id {
            builder = builder.field("parent_id", parent.to_string());
        }
        self.emit(builder).await.map(|_| ())
    }

    pub fn record_tool_execution(&self) {
        self.tool_executions_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tool_executions_count(&self) -> u64 {
        self.tool_executions_count.load(Ordering::Relaxed)
    }

    pub async fn findings_count(&self) -> usize {
        self.findings.len().await
    }

    pub async fn set_final_result(&self, content: &str, success: bool, agents_count: usize) -> Result<()> {
        let report_path = self.run_dir.join(crate::constants::REPORT_FILE);
        crate::persistence::atomic_write_bytes(&report_path, content.as_bytes()).await?;
        self.emit(EventBuilder::new(EventKind::ScanEnd).field("success", success)).await?;
        self.save_run_state(true, agents_count).await
    }

    pub async fn save_metadata(&self) -> Result<()> {
        let metadata = RunMetadata {
            run_id: self.run_id.clone(),
            run_name: self.run_name.clone(),
            start_time: self.start_time,
            targets: Vec::new(),
        };
        atomic_write_json(&self.run_dir.join(crate::constants::METADATA_FILE), &metadata).await
    }

    pub async fn save_run_state(&self, is_complete: bool, agents_count: usize) -> Result<()> {
        let state = RunState {
            run_id: self.run_id.clone(),
            run_name: self.run_name.clone(),
            start_time: self.start_time,
            end_time: if is_complete { Some(Utc::now()) } else { None },
            is_complete,
            is_continuation: self.is_continuation,
            continuation_context: serde_json::Map::new(),
            agents_count,
            tool_executions_count: self.tool_executions_count.load(Ordering::Relaxed),
            vulnerability_reports_count: self.findings.len().await,
            has_plan: self.run_dir.join(crate::constants::RUN_PLAN_FILE).exists(),
        };
        atomic_write_json(&self.run_dir.join(crate::constants::RUN_STATE_FILE), &state).await
    }
}

async fn load_existing_events(path: &std::path::Path) -> Result<Vec<TracerEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = tokio::fs::read_to_string(path).await?;
    let mut events = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(line)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    #[tokio::test]
    async fn emit_assigns_monotonic_ids_and_persists() {
        let dir = tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), "run-a".to_string()).await.unwrap();
        let e1 = tracer.emit(EventBuilder::new(EventKind::ScanStart)).await.unwrap();
        let e2 = tracer.emit(EventBuilder::new(EventKind::AgentIteration)).await.unwrap();
        assert_eq!(e2.event_id, e1.event_id + 1);

        let contents = tokio::fs::read_to_string(dir.path().join("run-a/events.jsonl")).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn events_since_filters_by_cursor() {
        let dir = tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), "run-b".to_string()).await.unwrap();
        tracer.emit(EventBuilder::new(EventKind::ScanStart)).await.unwrap();
        let second = tracer.emit(EventBuilder::new(EventKind::AgentIteration)).await.unwrap();
        let (events, cursor) = tracer.events_since(second.event_id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(cursor, second.event_id + 1);
    }

    #[tokio::test]
    async fn subscriber_panic_is_caught_and_does_not_block_emit() {
        let dir = tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), "run-c".to_string()).await.unwrap();
        tracer.subscribe(Arc::new(|_event: &TracerEvent| panic!("boom"))).await;
        let result = tracer.emit(EventBuilder::new(EventKind::ScanStart)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let dir = tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), "run-d".to_string()).await.unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        tracer
            .subscribe(Arc::new(move |_event: &TracerEvent| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            }))
            .await;
        tracer.emit(EventBuilder::new(EventKind::ScanStart)).await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn reopening_same_run_dir_resumes_event_ids_as_continuation() {
        let dir = tempdir().unwrap();
        {
            let tracer = Tracer::create(dir.path(), "run-e".to_string()).await.unwrap();
            tracer.emit(EventBuilder::new(EventKind::ScanStart)).await.unwrap();
        }
        let resumed = Tracer::create(dir.path(), "run-e".to_string()).await.unwrap();
        assert!(resumed.is_continuation());
        let next = resumed.emit(EventBuilder::new(EventKind::AgentIteration)).await.unwrap();
        assert_eq!(next.event_id, 2);
    }

    #[tokio::test]
    async fn add_finding_emits_vulnerability_found_event() {
        let dir = tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), "run-f".to_string()).await.unwrap();
        tracer.add_finding("T".into(), "B".into(), Severity::Medium).await.unwrap();
        let (events, _) = tracer.events_since(0).await;
        assert!(events.iter().any(|e| e.event_type == EventKind::VulnerabilityFound));
    }
}
