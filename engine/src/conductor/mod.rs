//! Conductor System
//!
//! Drives a run through planning, proposal, pre-validation, execution and
//! outcome validation, with checkpoint rollback around every mutation.

pub mod confirm;
pub mod orchestrator;
pub mod planner;
pub mod proposer;
pub mod types;

pub use confirm::{AutoConfirm, StdinConfirmer};
pub use orchestrator::{Orchestrator, GENERATOR_FALLBACK_QUESTION};
pub use planner::LlmPlanner;
pub use proposer::LlmProposalGenerator;
pub use types::{Collaborators, OrchestratorSettings, RunPhase, RunReport};
