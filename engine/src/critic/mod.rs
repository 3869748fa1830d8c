//! Critic
//!
//! Deterministic gate between the proposal generator and the executor. Every
//! proposed action is reviewed on its own against four checks:
//!
//! 1. **Allow-list**: the action kind is one of the configured kinds
//! 2. **Schema**: every referenced column exists in the profile
//! 3. **Confidence**: the stated confidence reaches the threshold
//! 4. **Grounding**: at least one cited quote is a case-insensitive substring
//!    of the corpus text retrieved for the run's evidence query
//!
//! All failing checks contribute notes; any failure rejects the action. The
//! batch is accepted only when no action is rejected.
//!
//! The critic also judges outcomes: after execution the badness score must
//! strictly decrease and every applicable compliance invariant must hold.

use sdk::{
    Action, CompliancePredicate, Decision, EvidenceCorpus, EvidenceReference, FollowUp,
    FollowUpRoute, OutcomeVerdict, PlanDecision, Profile, Verdict, VerdictStatus,
};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::Domain;

/// Confidence threshold used when none is configured
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Outcome confidence when the outcome is improved and compliant
const HIGH_OUTCOME_CONFIDENCE: f64 = 0.9;
const LOW_OUTCOME_CONFIDENCE: f64 = 0.2;

/// Longest quote prefix echoed back in notes
const QUOTE_PREVIEW_CHARS: usize = 60;

/// Caller-supplied critic parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CriticConfig {
    pub allowed_actions: BTreeSet<String>,
    pub confidence_threshold: f64,
}

impl CriticConfig {
    pub fn new(allowed_actions: BTreeSet<String>, confidence_threshold: f64) -> Self {
        Self {
            allowed_actions,
            confidence_threshold,
        }
    }

    /// Allow-list of a domain preset with the given threshold
    pub fn for_domain(domain: Domain, confidence_threshold: f64) -> Self {
        Self::new(domain.allowed_actions(), confidence_threshold)
    }
}

/// A compliance predicate plus the policy that makes it binding
///
/// An invariant with `asserted_by` set only applies when that policy's quote
/// is grounded in the corpus; one without it always applies.
#[derive(Clone)]
pub struct OutcomeInvariant {
    pub predicate: Arc<dyn CompliancePredicate>,
    pub asserted_by: Option<EvidenceReference>,
}

impl OutcomeInvariant {
    pub fn always(predicate: Arc<dyn CompliancePredicate>) -> Self {
        Self {
            predicate,
            asserted_by: None,
        }
    }

    pub fn asserted_by(predicate: Arc<dyn CompliancePredicate>, policy: EvidenceReference) -> Self {
        Self {
            predicate,
            asserted_by: Some(policy),
        }
    }

    pub fn name(&self) -> &str {
        self.predicate.name()
    }

    /// Whether the invariant is in force for this corpus
    pub fn applies(&self, corpus_lower: &str) -> bool {
        match &self.asserted_by {
            Some(policy) => is_grounded(&policy.quote, corpus_lower),
            None => true,
        }
    }
}

impl fmt::Debug for OutcomeInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutcomeInvariant")
            .field("predicate", &self.predicate.name())
            .field("asserted_by", &self.asserted_by)
            .finish()
    }
}

/// Whether a quote is grounded in already lower-cased corpus text
///
/// The quote is trimmed and lower-cased; an empty quote is never grounded.
pub fn is_grounded(quote: &str, corpus_lower: &str) -> bool {
    let needle = quote.trim().to_lowercase();
    !needle.is_empty() && corpus_lower.contains(&needle)
}

/// Validation gate for proposals and outcomes
pub struct Critic {
    config: CriticConfig,
    corpus: Arc<dyn EvidenceCorpus>,
    invariants: Vec<OutcomeInvariant>,
    fetch_timeout: Duration,
}

impl Critic {
    /// Create a critic without outcome invariants
    pub fn new(config: CriticConfig, corpus: Arc<dyn EvidenceCorpus>) -> Self {
        Self {
            config,
            corpus,
            invariants: Vec::new(),
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_invariants(mut self, invariants: Vec<OutcomeInvariant>) -> Self {
        self.invariants = invariants;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn config(&self) -> &CriticConfig {
        &self.config
    }

    pub fn invariants(&self) -> &[OutcomeInvariant] {
        &self.invariants
    }

    /// Fetch and lower-case the corpus text for a query
    ///
    /// Transport errors and timeouts degrade to an empty corpus, which makes
    /// every citation ungrounded.
    pub async fn corpus_text(&self, query: &str) -> String {
        match tokio::time::timeout(self.fetch_timeout, self.corpus.fetch(query)).await {
            Ok(Ok(text)) => text.to_lowercase(),
            Ok(Err(e)) => {
                warn!("Evidence corpus unavailable, treating as empty: {}", e);
                String::new()
            }
            Err(_) => {
                warn!(
                    "Evidence corpus fetch timed out after {:?}, treating as empty",
                    self.fetch_timeout
                );
                String::new()
            }
        }
    }

    /// Review a proposed batch against the corpus retrieved for `query`
    pub async fn validate(&self, profile: &Profile, actions: &[Action], query: &str) -> PlanDecision {
        let corpus_lower = self.corpus_text(query).await;
        self.validate_against(profile, actions, &corpus_lower)
    }

    /// Review a proposed batch against corpus text that is already lower-cased
    pub fn validate_against(
        &self,
        profile: &Profile,
        actions: &[Action],
        corpus_lower: &str,
    ) -> PlanDecision {
        let mut seen_ids = HashSet::new();
        let mut verdicts = Vec::with_capacity(actions.len());
        let mut follow_ups = Vec::new();

        for action in actions {
            let first_occurrence = seen_ids.insert(action.id.as_str());
            let (verdict, follow_up) = self.review(action, profile, corpus_lower, first_occurrence);

            if verdict.is_accepted() {
                debug!("Critic accepted {} ({})", action.id, action.kind);
            } else {
                warn!(
                    "Critic rejected {} ({}): {}",
                    action.id,
                    action.kind,
                    verdict.notes.join("; ")
                );
            }

            verdicts.push(verdict);
            follow_ups.extend(follow_up);
        }

        let decision = if verdicts.iter().all(Verdict::is_accepted) {
            Decision::Accept
        } else {
            Decision::Revise
        };

        info!(
            "Critic decision {:?}: {} of {} action(s) accepted",
            decision,
            verdicts.iter().filter(|v| v.is_accepted()).count(),
            verdicts.len()
        );

        PlanDecision {
            decision,
            verdicts,
            follow_ups,
        }
    }

    fn review(
        &self,
        action: &Action,
        profile: &Profile,
        corpus_lower: &str,
        first_occurrence: bool,
    ) -> (Verdict, Option<FollowUp>) {
        let mut notes = Vec::new();
        let mut malformed = false;
        let mut needs_evidence = false;

        if !first_occurrence {
            notes.push(format!("Duplicate action id '{}' in batch", action.id));
            malformed = true;
        }

        if !self.config.allowed_actions.contains(&action.kind) {
            notes.push(format!("Action kind '{}' is not allowed", action.kind));
            malformed = true;
        }

        for column in action.referenced_columns() {
            if !profile.has_column(&column) {
                notes.push(format!("Column '{}' not present in profile", column));
                malformed = true;
            }
        }

        if !action.confidence.is_finite() || !(0.0..=1.0).contains(&action.confidence) {
            notes.push(format!("Confidence {} outside [0, 1]", action.confidence));
            malformed = true;
        } else if action.confidence < self.config.confidence_threshold {
            notes.push(format!(
                "Low confidence ({:.2}) below threshold {:.2}",
                action.confidence, self.config.confidence_threshold
            ));
            needs_evidence = true;
        }

        let mut confirmed = Vec::new();
        for reference in &action.evidence {
            let quote = reference.quote.trim();
            if quote.is_empty() {
                notes.push(format!("Empty evidence quote from '{}'", reference.policy_id));
            } else if is_grounded(quote, corpus_lower) {
                confirmed.push(reference.clone());
            } else {
                notes.push(format!(
                    "Evidence quote not found in corpus: '{}'",
                    preview(quote)
                ));
            }
        }
        if confirmed.is_empty() {
            notes.push("No grounded evidence".to_string());
            needs_evidence = true;
        }

        let rejected = malformed || needs_evidence;
        let status = if rejected {
            VerdictStatus::Rejected
        } else {
            VerdictStatus::Accepted
        };

        let follow_up = rejected.then(|| {
            let (route, prefix) = if malformed {
                (FollowUpRoute::Replan, "Proposal does not fit this dataset")
            } else {
                (
                    FollowUpRoute::AskHuman,
                    "Policy grounding missing. Ask a human to confirm this action or supply the policy text",
                )
            };
            FollowUp {
                action_id: action.id.clone(),
                route,
                reason: format!("{}: {}", prefix, notes.join("; ")),
            }
        });

        if !rejected {
            notes.push(format!("Grounded in {} policy reference(s)", confirmed.len()));
        }

        (
            Verdict {
                action_id: action.id.clone(),
                status,
                notes,
                confirmed,
            },
            follow_up,
        )
    }

    /// Judge an executed attempt against the corpus retrieved for `query`
    pub async fn validate_outcome(&self, before: &Profile, after: &Profile, query: &str) -> OutcomeVerdict {
        let corpus_lower = self.corpus_text(query).await;
        self.validate_outcome_against(before, after, &corpus_lower)
    }

    /// Judge an executed attempt against lower-cased corpus text
    ///
    /// Accepted iff the badness score strictly decreased and every invariant
    /// in force holds on `after`.
    pub fn validate_outcome_against(
        &self,
        before: &Profile,
        after: &Profile,
        corpus_lower: &str,
    ) -> OutcomeVerdict {
        let before_score = before.badness_score();
        let after_score = after.badness_score();
        let improved = after_score < before_score;

        let mut notes = Vec::new();
        let mut compliant = true;

        for invariant in &self.invariants {
            if !invariant.applies(corpus_lower) {
                debug!("Invariant '{}' not asserted by corpus, skipped", invariant.name());
                continue;
            }
            if !invariant.predicate.check(after) {
                compliant = false;
                let note = match &invariant.asserted_by {
                    Some(policy) => format!(
                        "Invariant '{}' violated while policy {} is in force",
                        invariant.name(),
                        policy.policy_id
                    ),
                    None => format!("Invariant '{}' violated", invariant.name()),
                };
                notes.push(note);
            }
        }

        if !improved {
            notes.push(format!(
                "No improvement detected (badness {} -> {})",
                before_score, after_score
            ));
        }

        let accepted = improved && compliant;
        if accepted {
            notes.push(format!(
                "Improved and compliant (badness {} -> {})",
                before_score, after_score
            ));
            info!("Outcome accepted: badness {} -> {}", before_score, after_score);
        } else {
            warn!("Outcome rejected: {}", notes.join("; "));
        }

        OutcomeVerdict {
            accepted,
            notes,
            confidence: if accepted {
                HIGH_OUTCOME_CONFIDENCE
            } else {
                LOW_OUTCOME_CONFIDENCE
            },
            before_score,
            after_score,
        }
    }
}

fn preview(quote: &str) -> String {
    if quote.chars().count() <= QUOTE_PREVIEW_CHARS {
        quote.to_string()
    } else {
        let head: String = quote.chars().take(QUOTE_PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdk::EngineError;

    struct StaticCorpus(&'static str);

    #[async_trait]
    impl EvidenceCorpus for StaticCorpus {
        async fn fetch(&self, _query: &str) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingCorpus;

    #[async_trait]
    impl EvidenceCorpus for FailingCorpus {
        async fn fetch(&self, _query: &str) -> Result<String, EngineError> {
            Err(EngineError::Corpus("policy store offline".to_string()))
        }
    }

    struct SlowCorpus;

    #[async_trait]
    impl EvidenceCorpus for SlowCorpus {
        async fn fetch(&self, _query: &str) -> Result<String, EngineError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok("Remove duplicate rows based on unique identifiers.".to_string())
        }
    }

    fn grounded_dedupe() -> Action {
        Action::new("FX001", "drop_duplicates", 0.9)
            .with_evidence("RAG-P4", "remove duplicate rows based on unique identifiers")
    }

    fn assert_ungrounded(decision: &PlanDecision) {
        assert!(!decision.is_accept());
        let verdict = &decision.verdicts[0];
        assert!(!verdict.is_accepted());
        assert!(verdict.notes.iter().any(|n| n == "No grounded evidence"));
        assert!(verdict.confirmed.is_empty());
    }

    fn critic() -> Critic {
        Critic::new(
            CriticConfig::for_domain(Domain::Cleaning, DEFAULT_CONFIDENCE_THRESHOLD),
            Arc::new(StaticCorpus("Remove duplicate rows based on unique identifiers.")),
        )
    }

    #[test]
    fn test_is_grounded_trims_and_ignores_case() {
        let corpus = "remove duplicate rows based on unique identifiers.";
        assert!(is_grounded("  Remove DUPLICATE rows ", corpus));
        assert!(!is_grounded("", corpus));
        assert!(!is_grounded("   ", corpus));
        assert!(!is_grounded("drop every row", corpus));
    }

    #[test]
    fn test_preview_truncates_long_quotes() {
        let quote = "x".repeat(100);
        assert_eq!(preview(&quote).len(), QUOTE_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_all_failing_checks_are_noted() {
        let profile = Profile::default();
        let action = Action::new("FX001", "drop_table", 0.1)
            .with_param("column", serde_json::json!("ghost"));

        let decision = critic().validate_against(&profile, &[action], "");
        let notes = &decision.verdicts[0].notes;

        assert!(notes.iter().any(|n| n.contains("'drop_table' is not allowed")));
        assert!(notes.iter().any(|n| n.contains("Column 'ghost'")));
        assert!(notes.iter().any(|n| n.contains("Low confidence (0.10)")));
        assert!(notes.iter().any(|n| n == "No grounded evidence"));
        assert_eq!(decision.follow_ups[0].route, FollowUpRoute::Replan);
    }

    #[test]
    fn test_duplicate_ids_reject_the_repeat() {
        let mut profile = Profile::default();
        profile.schema.insert("id".to_string(), "int64".to_string());
        let corpus = "remove duplicate rows based on unique identifiers.";
        let action = Action::new("FX001", "drop_duplicates", 0.9)
            .with_evidence("RAG-P4", "Remove duplicate rows");

        let decision = critic().validate_against(&profile, &[action.clone(), action], corpus);

        assert!(decision.verdicts[0].is_accepted());
        assert!(!decision.verdicts[1].is_accepted());
        assert_eq!(decision.decision, Decision::Revise);
    }

    #[test]
    fn test_nan_confidence_is_rejected() {
        let corpus = "remove duplicate rows based on unique identifiers.";
        let action = Action::new("FX001", "drop_duplicates", f64::NAN)
            .with_evidence("RAG-P4", "Remove duplicate rows");

        let decision = critic().validate_against(&Profile::default(), &[action], corpus);
        assert!(!decision.is_accept());
        assert!(decision.verdicts[0].notes[0].contains("outside [0, 1]"));
    }

    #[tokio::test]
    async fn test_validate_fetches_corpus() {
        let action = Action::new("FX001", "drop_duplicates", 0.9)
            .with_evidence("RAG-P4", "remove duplicate rows based on unique identifiers");

        let decision = critic()
            .validate(&Profile::default(), &[action], "data quality best practices")
            .await;

        assert!(decision.is_accept());
        assert_eq!(decision.verdicts[0].confirmed.len(), 1);
    }

    #[tokio::test]
    async fn test_corpus_error_degrades_to_ungrounded() {
        let critic = Critic::new(
            CriticConfig::for_domain(Domain::Cleaning, DEFAULT_CONFIDENCE_THRESHOLD),
            Arc::new(FailingCorpus),
        );

        assert_eq!(critic.corpus_text("data quality").await, "");
        let decision = critic
            .validate(&Profile::default(), &[grounded_dedupe()], "data quality")
            .await;
        assert_ungrounded(&decision);
    }

    #[tokio::test]
    async fn test_corpus_timeout_degrades_to_ungrounded() {
        let critic = Critic::new(
            CriticConfig::for_domain(Domain::Cleaning, DEFAULT_CONFIDENCE_THRESHOLD),
            Arc::new(SlowCorpus),
        )
        .with_fetch_timeout(Duration::from_millis(20));

        let decision = critic
            .validate(&Profile::default(), &[grounded_dedupe()], "data quality")
            .await;
        assert_ungrounded(&decision);
    }
}
