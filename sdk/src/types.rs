//! Data model shared by the critic, the orchestrator and their collaborators

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Parameter keys whose values name dataset columns
const COLUMN_PARAM_KEYS: [&str; 3] = ["column", "columns", "subset"];

/// Immutable description of a dataset at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub num_rows: u64,

    /// Column name to inferred type name
    pub schema: BTreeMap<String, String>,

    #[serde(default)]
    pub null_counts: BTreeMap<String, u64>,

    #[serde(default)]
    pub dup_rows: u64,

    /// Named defect metrics, e.g. `email_invalid_count`
    #[serde(default)]
    pub invalids: BTreeMap<String, u64>,
}

impl Profile {
    /// Whether the profiled dataset has a column with this name
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.contains_key(name)
    }

    /// Column names in schema order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.schema.keys().map(String::as_str)
    }

    /// Count of a named invalid metric, zero when the metric was not computed
    pub fn invalid(&self, metric: &str) -> u64 {
        self.invalids.get(metric).copied().unwrap_or(0)
    }

    /// Sum of invalid-metric counts plus the duplicate-row count
    pub fn badness_score(&self) -> u64 {
        self.invalids.values().sum::<u64>() + self.dup_rows
    }
}

/// A cited justification: policy identifier plus the quoted policy text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceReference {
    #[serde(alias = "source")]
    pub policy_id: String,
    pub quote: String,
}

impl EvidenceReference {
    pub fn new(policy_id: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            quote: quote.into(),
        }
    }
}

/// A proposed mutation of the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique within one proposal batch
    pub id: String,

    /// Action kind, checked against the critic's allow-list
    #[serde(alias = "action")]
    pub kind: String,

    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    #[serde(default)]
    pub description: String,

    pub confidence: f64,

    #[serde(default, alias = "policy_refs")]
    pub evidence: Vec<EvidenceReference>,
}

impl Action {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            params: BTreeMap::new(),
            description: String::new(),
            confidence,
            evidence: Vec::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Add an evidence reference
    pub fn with_evidence(mut self, policy_id: impl Into<String>, quote: impl Into<String>) -> Self {
        self.evidence.push(EvidenceReference::new(policy_id, quote));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Every column name referenced by the parameters
    ///
    /// `column` holds a single name; `columns` and `subset` hold either a
    /// single name or a list of names.
    pub fn referenced_columns(&self) -> BTreeSet<String> {
        let mut columns = BTreeSet::new();
        for key in COLUMN_PARAM_KEYS {
            match self.params.get(key) {
                Some(Value::String(name)) => {
                    columns.insert(name.clone());
                }
                Some(Value::Array(items)) => {
                    columns.extend(items.iter().filter_map(Value::as_str).map(String::from));
                }
                _ => {}
            }
        }
        columns
    }
}

/// Critic verdict status for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Accepted,
    Rejected,
}

/// Critic output for one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub action_id: String,
    pub status: VerdictStatus,
    pub notes: Vec<String>,

    /// The references whose quotes were found in the corpus
    pub confirmed: Vec<EvidenceReference>,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        self.status == VerdictStatus::Accepted
    }
}

/// Overall decision for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Revise,
}

/// Where a rejected action should be escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpRoute {
    /// A human confirms the action or supplies the missing evidence
    AskHuman,
    /// The proposal is malformed for this dataset and must be re-planned
    Replan,
}

/// Suggested follow-up for one rejected action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub action_id: String,
    pub route: FollowUpRoute,
    pub reason: String,
}

/// Aggregate of all verdicts for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDecision {
    pub decision: Decision,
    pub verdicts: Vec<Verdict>,
    pub follow_ups: Vec<FollowUp>,
}

impl PlanDecision {
    pub fn is_accept(&self) -> bool {
        self.decision == Decision::Accept
    }

    /// Individually accepted actions from the batch this decision was made on.
    ///
    /// Verdicts are paired with actions by position, so a repeated id only
    /// carries the verdict of its own slot.
    pub fn accepted_actions(&self, proposed: &[Action]) -> Vec<Action> {
        proposed
            .iter()
            .zip(&self.verdicts)
            .filter(|(_, verdict)| verdict.is_accepted())
            .map(|(action, _)| action.clone())
            .collect()
    }

    pub fn rejected(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.is_accepted())
    }

    pub fn verdict(&self, action_id: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.action_id == action_id)
    }
}

/// Result of before/after outcome validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeVerdict {
    pub accepted: bool,
    pub notes: Vec<String>,

    /// Coarse signal for retry heuristics only
    pub confidence: f64,

    pub before_score: u64,
    pub after_score: u64,
}

/// Output of the planning stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub steps: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// Output of the proposal stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

impl Proposal {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            open_questions: Vec::new(),
        }
    }

    /// An empty batch carrying a question for a human
    pub fn escalate(question: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            open_questions: vec![question.into()],
        }
    }
}

/// Durable read-only copy of a dataset taken at run start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,

    /// Store-specific location of the copy
    pub locator: String,

    /// Content digest, e.g. `blake3:<hex>`
    pub digest: String,

    pub created_at: i64,
}

/// Policy governing how a failed gate is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    /// Halt on pre-validation failure, roll back on outcome failure
    Strict,
    /// Re-propose once on pre-validation failure, retry on outcome failure
    #[default]
    Adaptive,
    /// Execute the accepted subset, commit even when non-compliant
    Permissive,
}

impl SafetyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyMode::Strict => "strict",
            SafetyMode::Adaptive => "adaptive",
            SafetyMode::Permissive => "permissive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(SafetyMode::Strict),
            "adaptive" => Some(SafetyMode::Adaptive),
            "permissive" => Some(SafetyMode::Permissive),
            _ => None,
        }
    }
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Committed,
    Halted,
    NothingToDo,
    Cancelled,
    RolledBack,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Committed => "committed",
            RunStatus::Halted => "halted",
            RunStatus::NothingToDo => "nothing_to_do",
            RunStatus::Cancelled => "cancelled",
            RunStatus::RolledBack => "rolled_back",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "committed" => Some(RunStatus::Committed),
            "halted" => Some(RunStatus::Halted),
            "nothing_to_do" => Some(RunStatus::NothingToDo),
            "cancelled" => Some(RunStatus::Cancelled),
            "rolled_back" => Some(RunStatus::RolledBack),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Whether the dataset content changed as a result of the run
    pub fn mutated(&self) -> bool {
        matches!(self, RunStatus::Committed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub dataset: String,
    pub domain: String,
    pub safety_mode: SafetyMode,
    pub status: RunStatus,

    /// False when a permissive run committed despite a failed outcome check
    pub compliant: bool,

    pub attempts: u32,

    /// Actions that were executed, across all attempts
    pub actions: Vec<Action>,

    /// Identifiers of actions rejected by the critic and not executed
    pub skipped: Vec<String>,

    pub outcome: Option<OutcomeVerdict>,

    /// Which check failed on which action, for halted and rolled-back runs
    pub notes: Vec<String>,

    pub timestamp: i64,
}
