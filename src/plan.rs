//! Run Plan: a task graph with dependencies, phases, and resume support.
//!
//! A direct port of `original_source/strix/telemetry/run_plan.py`'s
//! `RunPlan`/`PlanTask`/`PlanPhase`.

use crate::persistence::atomic_write_json;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    PartiallyCompleted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub phase_id: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub iteration_started: Option<u32>,
    pub iteration_completed: Option<u32>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub phase_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: usize,
    pub status: PhaseStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub percent_complete: f64,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
    pub plan_id: String,
    pub run_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
    pub current_task_id: Option<String>,
    pub current_phase_id: Option<String>,
    #[serde(default)]
    pub is_paused: bool,
    pub pause_reason: Option<String>,
    #[serde(default)]
    pub resume_context: HashMap<String, Value>,
}

impl RunPlan {
    pub fn new(run_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            plan_id: format!("plan_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            run_name: run_name.into(),
            title: "Run Plan".to_string(),
            description: String::new(),
            created_at: now,
            updated_at: now,
            phases: Vec::new(),
            tasks: Vec::new(),
            current_task_id: None,
            current_phase_id: None,
            is_paused: false,
            pause_reason: None,
            resume_context: HashMap::new(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn add_phase(&mut self, title: impl Into<String>, description: impl Into<String>) -> &PlanPhase {
        let phase = PlanPhase {
            phase_id: format!("phase_{}", self.phases.len() + 1),
            title: title.into(),
            description: description.into(),
            order: self.phases.len(),
            status: PhaseStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.phases.push(phase);
        self.touch();
        self.phases.last().unwrap()
    }

    pub fn add_task(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        phase_id: Option<String>,
        depends_on: Vec<String>,
    ) -> &PlanTask {
        let task = PlanTask {
            task_id: format!("task_{}", self.tasks.len() + 1),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            phase_id,
            depends_on,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            iteration_started: None,
            iteration_completed: None,
            metadata: HashMap::new(),
        };
        self.tasks.push(task);
        self.touch();
        self.tasks.last().unwrap()
    }

    pub fn get_task(&self, task_id: &str) -> Option<&PlanTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn get_phase(&self, phase_id: &str) -> Option<&PlanPhase> {
        self.phases.iter().find(|p| p.phase_id == phase_id)
    }

    /// Only succeeds if every dependency is `completed` or `skipped`,
    /// matching the invariant in spec.md §3.
    pub fn start_task(&mut self, task_id: &str, iteration: Option<u32>) -> Result<()> {
        let deps_ok = {
            let task = self
                .get_task(task_id)
                .ok_or_else(|| crate::RuntimeError::InvalidPlanTransition(format!("unknown task {task_id}")))?;
            task.depends_on.iter().all(|dep| {
                self.get_task(dep).is_some_and(|d| matches!(d.status, TaskStatus::Completed | TaskStatus::Skipped))
            })
        };
        if !deps_ok {
            return Err(crate::RuntimeError::InvalidPlanTransition(format!(
                "task {task_id} has unsatisfied dependencies"
            )));
        }

        let phase_id = {
            let task = self.tasks.iter_mut().find(|t| t.task_id == task_id).unwrap();
            task.status = TaskStatus::InProgress;
            task.started_at = Some(Utc::now());
            task.iteration_started = iteration;
            task.phase_id.clone()
        };
        self.current_task_id = Some(task_id.to_string());

        if let Some(phase_id) = phase_id.as_deref() {
            if let Some(phase) = self.phases.iter_mut().find(|p| p.phase_id == phase_id) {
                if phase.status == PhaseStatus::Pending {
                    phase.status = PhaseStatus::InProgress;
                    phase.started_at = Some(Utc::now());
                    self.current_phase_id = Some(phase_id.to_string());
                }
            }
        }
        self.touch();
        Ok(())
    }

    pub fn complete_task(&mut self, task_id: &str, result: Option<Value>, iteration: Option<u32>) {
        let phase_id = self.set_terminal(task_id, TaskStatus::Completed, iteration, None, result);
        self.update_phase_status(phase_id.as_deref());
        self.touch();
    }

    pub fn fail_task(&mut self, task_id: &str, error: impl Into<String>, iteration: Option<u32>) {
        let phase_id = self.set_terminal(task_id, TaskStatus::Failed, iteration, Some(error.into()), None);
        self.update_phase_status(phase_id.as_deref());
        self.touch();
    }

    pub fn skip_task(&mut self, task_id: &str, reason: impl Into<String>) {
        let phase_id = self.set_terminal(task_id, TaskStatus::Skipped, None, Some(reason.into()), None);
        self.update_phase_status(phase_id.as_deref());
        self.touch();
    }

    fn set_terminal(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        iteration: Option<u32>,
        error: Option<String>,
        result: Option<Value>,
    ) -> Option<String> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.task_id == task_id) else {
            return None;
        };
        task.status = status;
        task.completed_at = Some(Utc::now());
        task.error = error;
        task.result = result;
        task.iteration_completed = iteration;
        if self.current_task_id.as_deref() == Some(task_id) {
            self.current_task_id = None;
        }
        task.phase_id.clone()
    }

    /// Highest-priority (earliest-added) pending task whose dependencies
    /// are all satisfied.
    pub fn get_next_task(&self) -> Option<&PlanTask> {
        let completed: std::collections::HashSet<&str> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.task_id.as_str())
            .collect();

        self.tasks.iter().find(|task| {
            task.status == TaskStatus::Pending && task.depends_on.iter().all(|d| completed.contains(d.as_str()))
        })
    }

    pub fn is_complete(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Skipped | TaskStatus::Failed))
    }

    pub fn get_progress(&self) -> Progress {
        let total = self.tasks.len();
        let completed = self.tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        let failed = self.tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();
        let skipped = self.tasks.iter().filter(|t| t.status == TaskStatus::Skipped).count();
        let in_progress = self.tasks.iter().filter(|t| t.status == TaskStatus::InProgress).count();
        let pending = self.tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
        Progress {
            total,
            completed,
            failed,
            skipped,
            in_progress,
            pending,
            percent_complete: (completed as f64 / total.max(1) as f64 * 1000.0).round() / 10.0,
            is_complete: self.is_complete(),
        }
    }

    pub fn pause(&mut self, reason: impl Into<String>, context: HashMap<String, Value>) {
        self.is_paused = true;
        self.pause_reason = Some(reason.into());
        if !context.is_empty() {
            self.resume_context = context;
        }
        self.touch();
    }

    pub fn resume(&mut self) -> HashMap<String, Value> {
        let context = std::mem::take(&mut self.resume_context);
        self.is_paused = false;
        self.pause_reason = None;
        self.touch();
        context
    }

    fn update_phase_status(&mut self, phase_id: Option<&str>) {
        let Some(phase_id) = phase_id else { return };
        let tasks: Vec<&PlanTask> = self.tasks.iter().filter(|t| t.phase_id.as_deref() == Some(phase_id)).collect();
        if tasks.is_empty() {
            return;
        }
        let all_completed = tasks.iter().all(|t| t.status == TaskStatus::Completed);
        let any_failed = tasks.iter().any(|t| t.status == TaskStatus::Failed);
        let any_in_progress = tasks.iter().any(|t| t.status == TaskStatus::InProgress);
        let all_done = tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped));

        let Some(phase) = self.phases.iter_mut().find(|p| p.phase_id == phase_id) else { return };
        if all_completed {
            phase.status = PhaseStatus::Completed;
            phase.completed_at = Some(Utc::now());
        } else if any_failed && all_done {
            phase.status = PhaseStatus::PartiallyCompleted;
            phase.completed_at = Some(Utc::now());
        } else if any_in_progress {
            phase.status = PhaseStatus::InProgress;
        }
    }

    pub async fn save(&self, run_dir: &Path) -> Result<()> {
        atomic_write_json(&run_dir.join(crate::constants::RUN_PLAN_FILE), self).await
    }

    pub async fn load(run_dir: &Path) -> Option<Self> {
        let path = run_dir.join(crate::constants::RUN_PLAN_FILE);
        let contents = tokio::fs::read(&path).await.ok()?;
        serde_json::from_slice(&contents).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn next_task_respects_dependency_completion() {
        let mut plan = RunPlan::new("run");
        plan.add_task("a", "", None, Vec::new());
        plan.add_task("b", "", None, vec!["task_1".to_string()]);

        let next = plan.get_next_task().unwrap().task_id.clone();
        assert_eq!(next, "task_1");

        assert!(plan.start_task("task_2", None).is_err());

        plan.start_task("task_1", None).unwrap();
        plan.complete_task("task_1", None, None);
        let next = plan.get_next_task().unwrap().task_id.clone();
        assert_eq!(next, "task_2");
    }

    #[test]
    fn completing_all_tasks_in_a_phase_completes_the_phase() {
        let mut plan = RunPlan::new("run");
        plan.add_phase("phase one", "");
        plan.add_task("a", "", Some("phase_1".to_string()), Vec::new());
        plan.start_task("task_1", None).unwrap();
        plan.complete_task("task_1", None, None);
        assert_eq!(plan.get_phase("phase_1").unwrap().status, PhaseStatus::Completed);
    }

    #[test]
    fn progress_counts_and_percent_are_correct() {
        let mut plan = RunPlan::new("run");
        plan.add_task("a", "", None, Vec::new());
        plan.add_task("b", "", None, Vec::new());
        plan.start_task("task_1", None).unwrap();
        plan.complete_task("task_1", None, None);
        let progress = plan.get_progress();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.percent_complete, 50.0);
        assert!(!progress.is_complete);
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let mut plan = RunPlan::new("run");
        plan.add_task("a", "desc", None, Vec::new());
        plan.save(dir.path()).await.unwrap();

        let loaded = RunPlan::load(dir.path()).await.unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.plan_id, plan.plan_id);
    }

    #[test]
    fn pause_then_resume_returns_saved_context() {
        let mut plan = RunPlan::new("run");
        let mut ctx = HashMap::new();
        ctx.insert("step".to_string(), Value::from(3));
        plan.pause("waiting on operator", ctx.clone());
        assert!(plan.is_paused);
        let resumed = plan.resume();
        assert!(!plan.is_paused);
        assert_eq!(resumed.get("step"), Some(&Value::from(3)));
    }
}
