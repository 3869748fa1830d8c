//! Conductor Orchestrator
//!
//! The safety-gated control loop:
//!
//! ```text
//! Planning -> Proposing -> PreValidating -> [Revising] -> Executing
//!          -> Evaluating -> PostValidating -> Committed | Retrying | RolledBack
//! ```
//!
//! A checkpoint of the live dataset is taken once at run start. The working
//! copy evolves across attempts and is written to the live store after each
//! execution; rollback always restores the start-of-run checkpoint, never an
//! intermediate attempt. The checkpoint is discarded once the run reaches a
//! terminal state, unless a restore failed, in which case it is kept for
//! manual recovery.

use chrono::Utc;
use sdk::{
    Action, Checkpoint, EngineError, FollowUp, OutcomeVerdict, PlanDecision, Profile, Proposal,
    ReviewReport, RunStatus, SafetyMode,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::types::{Collaborators, OrchestratorSettings, RunPhase, RunReport};
use crate::critic::Critic;

/// Open question attached when the generator fails or times out
pub const GENERATOR_FALLBACK_QUESTION: &str = "generator did not return valid output";

/// Working state of one run
struct RunState<D> {
    run_id: String,

    /// Start-of-run copy, the only rollback target
    checkpoint: Checkpoint,

    /// Current snapshot, evolved across attempts
    working: D,

    profile: Profile,
    baseline_score: u64,
    attempts: u32,
    retries: u32,
    mutated: bool,
    compliant: bool,
    executed: Vec<Action>,
    skipped: Vec<String>,
    decision: Option<PlanDecision>,
    outcome: Option<OutcomeVerdict>,
    open_questions: Vec<String>,
    notes: Vec<String>,
    phases: Vec<RunPhase>,
}

impl<D> RunState<D> {
    fn enter(&mut self, phase: RunPhase) {
        info!("Run {} attempt {}: {}", self.run_id, self.attempts, phase);
        self.phases.push(phase);
    }
}

/// Result of one pass through plan, propose, validate, execute, evaluate
enum Attempt {
    Halted,
    NothingToDo,
    Declined,
    Failed(EngineError),
    Evaluated(OutcomeVerdict),
}

/// Safety-gated controller over a dataset of type `D`
pub struct Orchestrator<D> {
    critic: Arc<Critic>,
    collaborators: Collaborators<D>,
    settings: OrchestratorSettings,
}

impl<D> Orchestrator<D> {
    pub fn new(
        critic: Arc<Critic>,
        collaborators: Collaborators<D>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            critic,
            collaborators,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Execute one complete run against the live dataset
    ///
    /// Returns `Err` only when the dataset could not be loaded, profiled or
    /// checkpointed (nothing was touched), or when a restore failed (the
    /// checkpoint is kept and its location is in the logs).
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        let c = &self.collaborators;
        let run_id = Uuid::new_v4().to_string();
        let dataset = c.store.name();
        let query = self.settings.domain.evidence_query(&dataset);

        info!(
            "Run {} started on {} (domain {}, mode {})",
            run_id, dataset, self.settings.domain, self.settings.safety_mode
        );

        let working = c.store.load()?;
        let checkpoint = c.backups.snapshot(&run_id)?;
        let profile = match c.profiler.analyze(&working) {
            Ok(profile) => profile,
            Err(e) => {
                self.discard(&checkpoint);
                return Err(e);
            }
        };

        let mut state = RunState {
            run_id,
            checkpoint,
            working,
            baseline_score: profile.badness_score(),
            profile,
            attempts: 0,
            retries: 0,
            mutated: false,
            compliant: true,
            executed: Vec::new(),
            skipped: Vec::new(),
            decision: None,
            outcome: None,
            open_questions: Vec::new(),
            notes: Vec::new(),
            phases: Vec::new(),
        };

        match self.drive(&mut state, &query).await {
            Ok(status) => {
                state.enter(status.into());
                self.discard(&state.checkpoint);
                let report = self.report(state, dataset, status);
                self.remember(&report).await;
                Ok(report)
            }
            Err(e) => {
                error!(
                    "Run {} could not restore its checkpoint, backup kept at {}: {}",
                    state.run_id, state.checkpoint.locator, e
                );
                state.notes.push(format!("Restore from checkpoint failed: {}", e));
                state.enter(RunPhase::Failed);
                let report = self.report(state, dataset, RunStatus::Failed);
                self.remember(&report).await;
                Err(e)
            }
        }
    }

    /// Attempt loop; `Err` means a restore failed
    async fn drive(&self, state: &mut RunState<D>, query: &str) -> Result<RunStatus, EngineError> {
        loop {
            state.attempts += 1;
            let in_retry = state.retries > 0;

            match self.attempt(state, query).await {
                Attempt::Halted if !in_retry => return Ok(RunStatus::Halted),
                Attempt::NothingToDo if !in_retry => return Ok(RunStatus::NothingToDo),
                Attempt::Declined if !state.mutated => return Ok(RunStatus::Cancelled),
                Attempt::Declined => {
                    state
                        .notes
                        .push("Retry declined at the confirmation gate".to_string());
                    return self.roll_back(state);
                }
                Attempt::Failed(e) => {
                    warn!("Run {} attempt {} failed: {}", state.run_id, state.attempts, e);
                    state.notes.push(format!("Execution failed: {}", e));
                    self.collaborators.backups.restore(&state.checkpoint)?;
                    return Ok(RunStatus::Failed);
                }
                Attempt::Evaluated(verdict) if verdict.accepted => {
                    return Ok(RunStatus::Committed);
                }
                Attempt::Evaluated(_) => match self.settings.safety_mode {
                    SafetyMode::Strict => return self.roll_back(state),
                    SafetyMode::Permissive => {
                        state.compliant = false;
                        state
                            .notes
                            .push("Committed despite a failed outcome check".to_string());
                        return Ok(RunStatus::Committed);
                    }
                    SafetyMode::Adaptive => {}
                },
                // A retry that ends without executing still consumes the retry
                Attempt::Halted | Attempt::NothingToDo => {}
            }

            if state.retries >= self.settings.max_retries {
                state.notes.push(format!(
                    "Retry bound of {} exhausted without an accepted outcome",
                    self.settings.max_retries
                ));
                return self.roll_back(state);
            }
            state.retries += 1;
            state.enter(RunPhase::Retrying);
        }
    }

    async fn attempt(&self, state: &mut RunState<D>, query: &str) -> Attempt {
        let c = &self.collaborators;
        let mode = self.settings.safety_mode;

        state.enter(RunPhase::Planning);
        let steps = self.plan(&state.profile).await;

        state.enter(RunPhase::Proposing);
        let proposal = self.propose(&state.profile, &steps, &[]).await;
        let mut questions = proposal.open_questions;
        let mut proposed = proposal.actions;

        state.enter(RunPhase::PreValidating);
        let mut decision = self.critic.validate(&state.profile, &proposed, query).await;

        if !decision.is_accept() && mode == SafetyMode::Adaptive {
            state.enter(RunPhase::Revising);
            let revised = self
                .propose(&state.profile, &steps, &decision.follow_ups)
                .await;
            questions.extend(revised.open_questions);
            proposed = revised.actions;

            state.enter(RunPhase::PreValidating);
            decision = self.critic.validate(&state.profile, &proposed, query).await;
        }

        state.open_questions.extend(questions.iter().cloned());
        state
            .skipped
            .extend(decision.rejected().map(|v| v.action_id.clone()));

        let batch: Vec<Action> = if decision.is_accept() {
            proposed.clone()
        } else if mode == SafetyMode::Permissive {
            decision.accepted_actions(&proposed)
        } else {
            for verdict in decision.rejected() {
                state.notes.push(format!(
                    "attempt {}: {} rejected: {}",
                    state.attempts,
                    verdict.action_id,
                    verdict.notes.join("; ")
                ));
            }
            warn!(
                "Run {} halted at pre-validation ({} mode)",
                state.run_id, mode
            );
            state.decision = Some(decision);
            return Attempt::Halted;
        };

        if batch.is_empty() {
            state.notes.push(format!(
                "attempt {}: no accepted actions to apply",
                state.attempts
            ));
            state.decision = Some(decision);
            return Attempt::NothingToDo;
        }

        let review = ReviewReport {
            run_id: state.run_id.clone(),
            attempt: state.attempts,
            decision: decision.clone(),
            proposed,
            to_execute: batch.clone(),
            open_questions: questions,
        };
        state.decision = Some(decision);

        if !c.confirmer.confirm(&review).await {
            info!("Run {}: execution declined", state.run_id);
            state
                .notes
                .push(format!("attempt {}: declined at the confirmation gate", state.attempts));
            return Attempt::Declined;
        }

        state.enter(RunPhase::Executing);
        let next = match c.executor.apply(&state.working, &batch) {
            Ok(next) => next,
            Err(e) => return Attempt::Failed(e),
        };
        state.mutated = true;
        if let Err(e) = c.store.write(&next) {
            return Attempt::Failed(e);
        }
        state.working = next;
        state.executed.extend(batch);

        state.enter(RunPhase::Evaluating);
        let after = match c.profiler.analyze(&state.working) {
            Ok(after) => after,
            Err(e) => return Attempt::Failed(e),
        };

        state.enter(RunPhase::PostValidating);
        let verdict = self
            .critic
            .validate_outcome(&state.profile, &after, query)
            .await;
        if !verdict.accepted {
            let attempt = state.attempts;
            state
                .notes
                .extend(verdict.notes.iter().map(|n| format!("attempt {}: {}", attempt, n)));
        }
        state.profile = after;
        state.outcome = Some(verdict.clone());

        Attempt::Evaluated(verdict)
    }

    /// Checklist from the planner, or the domain fallback
    async fn plan(&self, profile: &Profile) -> Vec<String> {
        let timeout = self.settings.collaborator_timeout;
        let planned =
            tokio::time::timeout(timeout, self.collaborators.planner.plan(profile)).await;

        match planned {
            Ok(Ok(checklist)) if !checklist.steps.is_empty() => checklist.steps,
            Ok(Ok(_)) => {
                warn!("Planner returned no steps, using fallback checklist");
                self.settings.domain.fallback_steps()
            }
            Ok(Err(e)) => {
                warn!("Planner failed, using fallback checklist: {}", e);
                self.settings.domain.fallback_steps()
            }
            Err(_) => {
                warn!("Planner timed out after {:?}, using fallback checklist", timeout);
                self.settings.domain.fallback_steps()
            }
        }
    }

    /// Proposal from the generator, or an empty batch with an open question
    async fn propose(&self, profile: &Profile, steps: &[String], feedback: &[FollowUp]) -> Proposal {
        let timeout = self.settings.collaborator_timeout;
        let proposed = tokio::time::timeout(
            timeout,
            self.collaborators.proposer.propose(profile, steps, feedback),
        )
        .await;

        match proposed {
            Ok(Ok(proposal)) => proposal,
            Ok(Err(e)) => {
                warn!("Proposal generator failed: {}", e);
                Proposal::escalate(GENERATOR_FALLBACK_QUESTION)
            }
            Err(_) => {
                warn!("Proposal generator timed out after {:?}", timeout);
                Proposal::escalate(GENERATOR_FALLBACK_QUESTION)
            }
        }
    }

    fn roll_back(&self, state: &mut RunState<D>) -> Result<RunStatus, EngineError> {
        self.collaborators.backups.restore(&state.checkpoint)?;
        info!("Run {} rolled back to its checkpoint", state.run_id);
        Ok(RunStatus::RolledBack)
    }

    fn discard(&self, checkpoint: &Checkpoint) {
        if let Err(e) = self.collaborators.backups.discard(checkpoint) {
            warn!("Failed to discard checkpoint of run {}: {}", checkpoint.run_id, e);
        }
    }

    async fn remember(&self, report: &RunReport) {
        if let Err(e) = self.collaborators.memory.append(&report.to_record()).await {
            warn!("Failed to persist record of run {}: {}", report.run_id, e);
        }
    }

    fn report(&self, state: RunState<D>, dataset: String, status: RunStatus) -> RunReport {
        let final_score = if status.mutated() {
            state.profile.badness_score()
        } else {
            state.baseline_score
        };

        RunReport {
            run_id: state.run_id,
            dataset,
            domain: self.settings.domain,
            safety_mode: self.settings.safety_mode,
            status,
            compliant: state.compliant,
            attempts: state.attempts,
            baseline_score: state.baseline_score,
            final_score,
            executed: state.executed,
            skipped: state.skipped,
            decision: state.decision,
            outcome: state.outcome,
            open_questions: state.open_questions,
            notes: state.notes,
            phases: state.phases,
            timestamp: Utc::now().timestamp(),
        }
    }
}
