//! Reconciler: opportunistic anomaly detection and safe repair for a single
//! agent's state.
//!
//! A near line-for-line semantic port of
//! `original_source/strix/agents/reconciliation.py`'s `StateReconciler`: the
//! same five detections and the same `auto_fixable` flag. Rust has no
//! `setattr`, so patches target an explicit enum of patchable fields rather
//! than a string path.

use crate::agent::state::{AgentState, AgentStatus};
use crate::constants::{
    RECONCILER_LOOP_PREFIX_LEN, RECONCILER_LOOP_REPEAT_THRESHOLD, RECONCILER_LOOP_WINDOW_MESSAGES,
    RECONCILER_RATE_LIMIT_ERROR_THRESHOLD, RECONCILER_STALE_WAIT_SECONDS,
};
use crate::models::{Message, Role as ConversationRole};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    StateInconsistency,
    InvalidValue,
    LoopDetected,
    RateLimitDetected,
    StaleWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub issue_type: IssueType,
    pub description: String,
    pub severity: IssueSeverity,
    pub auto_fixable: bool,
}

/// The nearest idiomatic equivalent of `setattr(state, field_path, value)`:
/// a named enum of exactly the fields a reconciler patch ever touches.
#[derive(Debug, Clone)]
pub enum Patch {
    ClampIteration(u32),
    ClearRecoveryInconsistency,
}

pub struct Reconciler;

impl Reconciler {
    /// Runs every detection and returns the issues found, without mutating
    /// state.
    pub fn check(state: &AgentState) -> Vec<Issue> {
        let mut issues = Vec::new();

        if state.status == AgentStatus::WaitingForRecovery && state.waiting_start_time.is_none() {
            issues.push(Issue {
                issue_type: IssueType::StateInconsistency,
                description: "waiting_for_recovery status without waiting_start_time set".to_string(),
                severity: IssueSeverity::High,
                auto_fixable: true,
            });
        }

        if state.iteration > state.max_iterations {
            issues.push(Issue {
                issue_type: IssueType::InvalidValue,
                description: format!(
                    "iteration {} exceeds max_iterations {}",
                    state.iteration, state.max_iterations
                ),
                severity: IssueSeverity::Medium,
                auto_fixable: true,
            });
        }

        let rate_limit_errors = state
            .errors
            .iter()
            .filter(|e| {
                let lower = e.to_lowercase();
                lower.contains("rate limit") || lower.contains("429")
            })
            .count();
        if rate_limit_errors >= RECONCILER_RATE_LIMIT_ERROR_THRESHOLD {
            issues.push(Issue {
                issue_type: IssueType::RateLimitDetected,
                description: format!("multiple rate limit errors detected ({rate_limit_errors})"),
                severity: IssueSeverity::High,
                auto_fixable: false,
            });
        }

        if let Some(issue) = detect_loop(&state.messages) {
            issues.push(issue);
        }

        if state.is_waiting_for_input() {
            if let Some(started) = state.waiting_start_time {
                let elapsed = (Utc::now() - started).num_seconds();
                if elapsed > RECONCILER_STALE_WAIT_SECONDS && state.status != AgentStatus::WaitingForRecovery {
                    issues.push(Issue {
                        issue_type: IssueType::StaleWait,
                        description: format!("agent has been waiting for input for {elapsed}s"),
                        severity: IssueSeverity::Medium,
                        auto_fixable: false,
                    });
                }
            }
        }

        issues
    }

    /// Applies the auto-fixable subset of `check(state)`'s issues in place,
    /// returning the patches applied. Emits no new thinker call.
    pub fn auto_fix(state: &mut AgentState) -> Vec<Patch> {
        let issues = Self::check(state);
        let mut applied = Vec::new();

        for issue in issues {
            if !issue.auto_fixable {
                continue;
            }
            match issue.issue_type {
                IssueType::InvalidValue => {
                    state.iteration = state.max_iterations;
                    applied.push(Patch::ClampIteration(state.max_iterations));
                }
                IssueType::StateInconsistency => {
                    state.waiting_start_time = Some(Utc::now());
                    applied.push(Patch::ClearRecoveryInconsistency);
                }
                _ => {}
            }
        }

        applied
    }

    /// Appends a structured checkpoint message summarizing state and any
    /// issues, so the next iteration's thinker call sees it.
    pub fn inject_checkpoint(state: &mut AgentState, issues: &[Issue]) {
        let mut lines = vec![
            "<state_reconciliation>".to_string(),
            "<notice>Automatic state reconciliation checkpoint.</notice>".to_string(),
            String::new(),
            format!("Agent: {} ({})", state.agent_name, state.agent_id),
            format!("Iteration: {}/{}", state.iteration, state.max_iterations),
            format!("Status: {:?}", state.status),
            format!("Total messages: {}", state.messages.len()),
            format!("Total errors: {}", state.errors.len()),
        ];

        if !issues.is_empty() {
            lines.push(String::new());
            lines.push("IDENTIFIED ISSUES:".to_string());
            for issue in issues {
                lines.push(format!("  - [{:?}] {:?}: {}", issue.severity, issue.issue_type, issue.description));
            }
        }
        lines.push("</state_reconciliation>".to_string());

        state.add_message(Message { role: ConversationRole::User, content: lines.join("\n") });
    }
}

fn detect_loop(messages: &[Message]) -> Option<Issue> {
    if messages.len() < RECONCILER_LOOP_WINDOW_MESSAGES {
        return None;
    }
    let window = &messages[messages.len() - RECONCILER_LOOP_WINDOW_MESSAGES..];
    let assistant_prefixes: Vec<String> = window
        .iter()
        .filter(|m| m.role == ConversationRole::Assistant)
        .map(|m| m.content.chars().take(RECONCILER_LOOP_PREFIX_LEN).collect())
        .collect();

    if assistant_prefixes.len() >= RECONCILER_LOOP_REPEAT_THRESHOLD {
        let distinct: HashSet<&String> = assistant_prefixes.iter().collect();
        if distinct.len() == 1 {
            return Some(Issue {
                issue_type: IssueType::LoopDetected,
                description: "agent appears to be in a loop (repeated identical responses)".to_string(),
                severity: IssueSeverity::Critical,
                auto_fixable: false,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::roles::Role;

    fn state() -> AgentState {
        AgentState::new(Role::VulnerabilityTester, "task".to_string(), 10, 300)
    }

    #[test]
    fn detects_iteration_exceeding_max_and_auto_fixes() {
        let mut s = state();
        s.iteration = 15;
        let issues = Reconciler::check(&s);
        assert!(issues.iter().any(|i| i.issue_type == IssueType::InvalidValue));

        Reconciler::auto_fix(&mut s);
        assert_eq!(s.iteration, s.max_iterations);
    }

    #[test]
    fn three_rate_limit_errors_trigger_detection() {
        let mut s = state();
        s.add_error("rate limit exceeded (429)");
        s.add_error("rate limit hit again");
        s.add_error("429 too many requests");
        let issues = Reconciler::check(&s);
        assert!(issues.iter().any(|i| i.issue_type == IssueType::RateLimitDetected && !i.auto_fixable));
    }

    #[test]
    fn six_identical_assistant_prefixes_trigger_loop_detection() {
        let mut s = state();
        for _ in 0..6 {
            s.add_message(Message::assistant("doing the exact same thing again"));
        }
        let issues = Reconciler::check(&s);
        assert!(issues.iter().any(|i| i.issue_type == IssueType::LoopDetected));
    }

    #[test]
    fn recovery_status_without_waiting_time_is_auto_fixable_inconsistency() {
        let mut s = state();
        s.status = AgentStatus::WaitingForRecovery;
        s.waiting_start_time = None;
        let issues = Reconciler::check(&s);
        assert!(issues.iter().any(|i| i.issue_type == IssueType::StateInconsistency && i.auto_fixable));
        Reconciler::auto_fix(&mut s);
        assert!(s.waiting_start_time.is_some());
    }

    #[test]
    fn inject_checkpoint_appends_user_message() {
        let mut s = state();
        let issues = Reconciler::check(&s);
        let before = s.messages.len();
        Reconciler::inject_checkpoint(&mut s, &issues);
        assert_eq!(s.messages.len(), before + 1);
        assert_eq!(s.messages.last().unwrap().role, ConversationRole::User);
    }
}
