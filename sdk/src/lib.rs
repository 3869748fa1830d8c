//! Warden SDK
//!
//! Shared library providing the data model, error type and collaborator ports
//! of the warden controller. The engine implements the controller against these
//! ports; alternative collaborators only need this crate.

/// Error types and handling
pub mod errors;

/// Collaborator traits
pub mod ports;

/// Review report rendering
pub mod report;

/// Profiles, actions, verdicts and run records
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, WardenErrorExt};
pub use ports::{
    ActionExecutor, BackupStore, CompliancePredicate, Confirmer, DatasetStore, EvidenceCorpus,
    Planner, Profiler, ProposalGenerator, RunMemory,
};
pub use report::ReviewReport;
pub use types::{
    Action, Checklist, Checkpoint, Decision, EvidenceReference, FollowUp, FollowUpRoute,
    OutcomeVerdict, PlanDecision, Profile, Proposal, RunRecord, RunStatus, SafetyMode, Verdict,
    VerdictStatus,
};
