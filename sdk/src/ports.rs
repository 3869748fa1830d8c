//! Collaborator ports
//!
//! The controller talks to everything it does not own through these traits:
//! retrieval, planning, proposal generation, profiling, mutation, persistence
//! and the human confirmation gate. Production wiring lives in the engine;
//! tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::report::ReviewReport;
use crate::types::{Action, Checklist, Checkpoint, FollowUp, Profile, Proposal, RunRecord};

/// Text-retrieval subsystem queried by the critic
#[async_trait]
pub trait EvidenceCorpus: Send + Sync {
    /// Best-effort concatenation of snippets relevant to `query`
    ///
    /// An empty string is a valid response.
    async fn fetch(&self, query: &str) -> Result<String, EngineError>;
}

/// Produces the checklist of checks for a profile
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, profile: &Profile) -> Result<Checklist, EngineError>;
}

/// Turns a profile and a checklist into candidate actions
#[async_trait]
pub trait ProposalGenerator: Send + Sync {
    /// `feedback` carries the critic's follow-ups from a rejected batch
    async fn propose(
        &self,
        profile: &Profile,
        steps: &[String],
        feedback: &[FollowUp],
    ) -> Result<Proposal, EngineError>;
}

/// Computes a profile for a dataset snapshot
pub trait Profiler<D>: Send + Sync {
    fn analyze(&self, dataset: &D) -> Result<Profile, EngineError>;
}

/// Applies a batch of accepted actions
///
/// Must be all-or-nothing: an error means no part of the batch is visible in
/// the returned value, and the input snapshot is never modified.
pub trait ActionExecutor<D>: Send + Sync {
    fn apply(&self, dataset: &D, actions: &[Action]) -> Result<D, EngineError>;
}

/// The live dataset, exclusively owned by the active run
pub trait DatasetStore<D>: Send + Sync {
    /// Human-readable dataset name used in evidence queries and run records
    fn name(&self) -> String;

    fn load(&self) -> Result<D, EngineError>;

    fn write(&self, dataset: &D) -> Result<(), EngineError>;
}

/// Checkpoint discipline around the live dataset
pub trait BackupStore: Send + Sync {
    /// Capture a durable copy of the live dataset for `run_id`
    fn snapshot(&self, run_id: &str) -> Result<Checkpoint, EngineError>;

    /// Atomically replace the live dataset with the checkpoint content
    ///
    /// Idempotent, and safe to call when nothing was mutated.
    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), EngineError>;

    /// Release the checkpoint once the run is over
    fn discard(&self, checkpoint: &Checkpoint) -> Result<(), EngineError>;
}

/// Append-only log of finished runs
#[async_trait]
pub trait RunMemory: Send + Sync {
    async fn append(&self, record: &RunRecord) -> Result<(), EngineError>;
}

/// Domain-specific invariant re-checked after execution
pub trait CompliancePredicate: Send + Sync {
    fn name(&self) -> &str;

    /// True when `after` satisfies the invariant
    fn check(&self, after: &Profile) -> bool;
}

/// Yes/no gate in front of execution
///
/// Blocks until a decision is supplied; there is no timeout.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, report: &ReviewReport) -> bool;
}
