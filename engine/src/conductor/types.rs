//! Conductor types
//!
//! Phases, settings, collaborator wiring and the final report of a run.

use sdk::{
    Action, ActionExecutor, BackupStore, Confirmer, DatasetStore, OutcomeVerdict, PlanDecision,
    Planner, Profiler, ProposalGenerator, RunMemory, RunRecord, RunStatus, SafetyMode,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::Domain;

/// States of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Proposing,
    PreValidating,
    Revising,
    Executing,
    Evaluating,
    PostValidating,
    Retrying,
    Committed,
    Halted,
    NothingToDo,
    Cancelled,
    RolledBack,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Planning => "planning",
            RunPhase::Proposing => "proposing",
            RunPhase::PreValidating => "pre_validating",
            RunPhase::Revising => "revising",
            RunPhase::Executing => "executing",
            RunPhase::Evaluating => "evaluating",
            RunPhase::PostValidating => "post_validating",
            RunPhase::Retrying => "retrying",
            RunPhase::Committed => "committed",
            RunPhase::Halted => "halted",
            RunPhase::NothingToDo => "nothing_to_do",
            RunPhase::Cancelled => "cancelled",
            RunPhase::RolledBack => "rolled_back",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RunStatus> for RunPhase {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Committed => RunPhase::Committed,
            RunStatus::Halted => RunPhase::Halted,
            RunStatus::NothingToDo => RunPhase::NothingToDo,
            RunStatus::Cancelled => RunPhase::Cancelled,
            RunStatus::RolledBack => RunPhase::RolledBack,
            RunStatus::Failed => RunPhase::Failed,
        }
    }
}

/// Tunables of one controller instance
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub domain: Domain,
    pub safety_mode: SafetyMode,

    /// Additional attempts allowed in adaptive mode after a failed outcome
    pub max_retries: u32,

    /// Upper bound on each planner or generator call
    pub collaborator_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            domain: Domain::default(),
            safety_mode: SafetyMode::default(),
            max_retries: 2,
            collaborator_timeout: Duration::from_secs(300),
        }
    }
}

/// Everything the controller talks to besides the critic
pub struct Collaborators<D> {
    pub planner: Arc<dyn Planner>,
    pub proposer: Arc<dyn ProposalGenerator>,
    pub profiler: Arc<dyn Profiler<D>>,
    pub executor: Arc<dyn ActionExecutor<D>>,
    pub store: Arc<dyn DatasetStore<D>>,
    pub backups: Arc<dyn BackupStore>,
    pub memory: Arc<dyn RunMemory>,
    pub confirmer: Arc<dyn Confirmer>,
}

impl<D> Clone for Collaborators<D> {
    fn clone(&self) -> Self {
        Self {
            planner: Arc::clone(&self.planner),
            proposer: Arc::clone(&self.proposer),
            profiler: Arc::clone(&self.profiler),
            executor: Arc::clone(&self.executor),
            store: Arc::clone(&self.store),
            backups: Arc::clone(&self.backups),
            memory: Arc::clone(&self.memory),
            confirmer: Arc::clone(&self.confirmer),
        }
    }
}

/// What happened in a run, returned to the caller and persisted as a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub dataset: String,
    pub domain: Domain,
    pub safety_mode: SafetyMode,
    pub status: RunStatus,

    /// False when a permissive run committed despite a failed outcome check
    pub compliant: bool,

    /// Execution attempts started, including the first
    pub attempts: u32,

    pub baseline_score: u64,
    pub final_score: u64,

    pub executed: Vec<Action>,
    pub skipped: Vec<String>,

    /// Critic decision of the last pre-validation
    pub decision: Option<PlanDecision>,

    /// Outcome verdict of the last executed attempt
    pub outcome: Option<OutcomeVerdict>,

    pub open_questions: Vec<String>,
    pub notes: Vec<String>,

    /// Every phase entered, in order
    pub phases: Vec<RunPhase>,

    pub timestamp: i64,
}

impl RunReport {
    /// Whether the controller ever entered `phase`
    pub fn visited(&self, phase: RunPhase) -> bool {
        self.phases.contains(&phase)
    }

    /// The append-only record persisted to run memory
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            run_id: self.run_id.clone(),
            dataset: self.dataset.clone(),
            domain: self.domain.to_string(),
            safety_mode: self.safety_mode,
            status: self.status,
            compliant: self.compliant,
            attempts: self.attempts,
            actions: self.executed.clone(),
            skipped: self.skipped.clone(),
            outcome: self.outcome.clone(),
            notes: self.notes.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Plain-text summary for terminals
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let flag = if self.status == RunStatus::Committed && !self.compliant {
            " [NON-COMPLIANT]"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "Run {} on {} ({} / {}): {}{}",
            self.run_id, self.dataset, self.domain, self.safety_mode, self.status, flag
        );
        let _ = writeln!(
            out,
            "  attempts: {}, badness {} -> {}",
            self.attempts, self.baseline_score, self.final_score
        );

        for action in &self.executed {
            let _ = writeln!(out, "  executed {} {}", action.id, action.kind);
        }
        if !self.skipped.is_empty() {
            let _ = writeln!(out, "  skipped: {}", self.skipped.join(", "));
        }
        for question in &self.open_questions {
            let _ = writeln!(out, "  question: {}", question);
        }
        for note in &self.notes {
            let _ = writeln!(out, "  - {}", note);
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: RunStatus, compliant: bool) -> RunReport {
        RunReport {
            run_id: "run-1".to_string(),
            dataset: "customers.json".to_string(),
            domain: Domain::Cleaning,
            safety_mode: SafetyMode::Permissive,
            status,
            compliant,
            attempts: 1,
            baseline_score: 8,
            final_score: 3,
            executed: vec![Action::new("FX001", "drop_duplicates", 0.9)],
            skipped: vec!["FX002".to_string()],
            decision: None,
            outcome: None,
            open_questions: vec![],
            notes: vec![],
            phases: vec![RunPhase::Planning, RunPhase::Committed],
            timestamp: 0,
        }
    }

    #[test]
    fn test_non_compliant_commit_is_flagged() {
        let text = report(RunStatus::Committed, false).render_text();
        assert!(text.contains("committed [NON-COMPLIANT]"));
        assert!(text.contains("skipped: FX002"));

        let text = report(RunStatus::Committed, true).render_text();
        assert!(!text.contains("NON-COMPLIANT"));
    }

    #[test]
    fn test_to_record_carries_domain_and_actions() {
        let record = report(RunStatus::Committed, true).to_record();
        assert_eq!(record.domain, "cleaning");
        assert_eq!(record.actions.len(), 1);
        assert_eq!(record.skipped, vec!["FX002".to_string()]);
    }

    #[test]
    fn test_terminal_phase_from_status() {
        assert_eq!(RunPhase::from(RunStatus::RolledBack), RunPhase::RolledBack);
        assert_eq!(RunPhase::PreValidating.to_string(), "pre_validating");
    }
}
