//! Integration tests for the critic
//!
//! Covers the four pre-validation checks, follow-up routing and outcome
//! validation with corpus-asserted invariants.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use sdk::{Action, Decision, FollowUpRoute, Profile, VerdictStatus};
use warden_engine::corpus::PolicyCorpus;
use warden_engine::critic::{Critic, CriticConfig};
use warden_engine::domain::Domain;

const QUERY: &str = "data quality best practices for dataset: customers.json";

const DQ_POLICY: &str = "Remove duplicate rows based on unique identifiers (e.g., `id`).\n\
Validate that numeric fields have no negative values unless explicitly allowed.";

const GDPR_POLICY: &str = "Personal identifiers such as email addresses must be masked before sharing.";

fn profile(dup_rows: u64, negatives: u64) -> Profile {
    let schema = [("id", "int64"), ("email", "string"), ("price", "int64")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut invalids = BTreeMap::new();
    invalids.insert("price_negative_count".to_string(), negatives);
    Profile {
        num_rows: 10,
        schema,
        null_counts: BTreeMap::new(),
        dup_rows,
        invalids,
    }
}

fn cleaning_critic(policy: &str) -> Critic {
    let corpus = Arc::new(PolicyCorpus::new(6).with_document("dq.md", policy));
    Critic::new(CriticConfig::for_domain(Domain::Cleaning, 0.70), corpus)
        .with_invariants(Domain::Cleaning.invariants())
}

fn grounded_dedupe() -> Action {
    Action::new("FX001", "drop_duplicates", 0.9)
        .with_param("subset", json!(["id"]))
        .with_evidence("RAG-P4", "remove duplicate rows")
}

#[tokio::test]
async fn test_low_confidence_action_forces_revise() {
    let critic = cleaning_critic(DQ_POLICY);
    let low = Action::new("FX002", "remove_negative_values", 0.5)
        .with_param("column", json!("price"))
        .with_evidence("RAG-P5", "no negative values");

    let decision = critic
        .validate(&profile(5, 3), &[grounded_dedupe(), low], QUERY)
        .await;

    assert_eq!(decision.decision, Decision::Revise);
    assert_eq!(decision.verdict("FX001").unwrap().status, VerdictStatus::Accepted);

    let rejected = decision.verdict("FX002").unwrap();
    assert_eq!(rejected.status, VerdictStatus::Rejected);
    assert!(rejected.notes.iter().any(|n| n.contains("0.50") && n.contains("0.70")));
    // Grounding still recorded for a low-confidence action
    assert_eq!(rejected.confirmed.len(), 1);

    assert_eq!(decision.follow_ups.len(), 1);
    assert_eq!(decision.follow_ups[0].route, FollowUpRoute::AskHuman);
}

#[tokio::test]
async fn test_ungrounded_references_are_dropped() {
    let critic = cleaning_critic(DQ_POLICY);
    let mixed = grounded_dedupe().with_evidence("RAG-P9", "made up policy text");
    let none = Action::new("FX002", "drop_duplicates", 0.95)
        .with_evidence("RAG-P9", "made up policy text")
        .with_evidence("RAG-P4", "   ");

    let decision = critic.validate(&profile(5, 0), &[mixed, none], QUERY).await;

    let partly = decision.verdict("FX001").unwrap();
    assert!(partly.is_accepted());
    assert_eq!(partly.confirmed.len(), 1);
    assert_eq!(partly.confirmed[0].policy_id, "RAG-P4");

    let ungrounded = decision.verdict("FX002").unwrap();
    assert!(!ungrounded.is_accepted());
    assert!(ungrounded.confirmed.is_empty());
    assert!(ungrounded.notes.iter().any(|n| n == "No grounded evidence"));
}

#[tokio::test]
async fn test_schema_failures_route_to_replan() {
    let critic = cleaning_critic(DQ_POLICY);
    let unknown = Action::new("FX001", "drop_table", 0.99).with_evidence("RAG-P4", "remove duplicate rows");
    let missing = Action::new("FX002", "impute_nulls", 0.99)
        .with_param("column", json!("signup_date"))
        .with_evidence("RAG-P4", "remove duplicate rows");

    let decision = critic.validate(&profile(0, 0), &[unknown, missing], QUERY).await;

    assert_eq!(decision.decision, Decision::Revise);
    assert!(decision
        .verdict("FX001")
        .unwrap()
        .notes
        .iter()
        .any(|n| n.contains("'drop_table'")));
    assert!(decision
        .verdict("FX002")
        .unwrap()
        .notes
        .iter()
        .any(|n| n.contains("'signup_date'")));
    assert!(decision
        .follow_ups
        .iter()
        .all(|f| f.route == FollowUpRoute::Replan));
}

#[tokio::test]
async fn test_empty_batch_is_accepted() {
    let critic = cleaning_critic(DQ_POLICY);
    let decision = critic.validate(&profile(5, 3), &[], QUERY).await;
    assert!(decision.is_accept());
    assert!(decision.verdicts.is_empty());
}

#[tokio::test]
async fn test_outcome_requires_strict_improvement() {
    let critic = cleaning_critic("Remove duplicate rows based on unique identifiers (e.g., `id`).");

    let same = critic.validate_outcome(&profile(5, 3), &profile(5, 3), QUERY).await;
    assert!(!same.accepted);
    assert_eq!(same.confidence, 0.2);

    let better = critic.validate_outcome(&profile(5, 3), &profile(0, 3), QUERY).await;
    assert!(better.accepted);
    assert_eq!(better.confidence, 0.9);
    assert_eq!((better.before_score, better.after_score), (8, 3));
}

#[tokio::test]
async fn test_invariant_applies_only_when_corpus_asserts_it() {
    let asserting = cleaning_critic(DQ_POLICY);
    let verdict = asserting
        .validate_outcome(&profile(5, 3), &profile(0, 3), QUERY)
        .await;
    assert!(!verdict.accepted);
    assert!(verdict.notes.iter().any(|n| n.contains("no negative prices")));

    let silent = cleaning_critic("Remove duplicate rows based on unique identifiers (e.g., `id`).");
    let verdict = silent
        .validate_outcome(&profile(5, 3), &profile(0, 3), QUERY)
        .await;
    assert!(verdict.accepted);
}

#[tokio::test]
async fn test_masking_invariant_checks_plaintext_emails() {
    let corpus = Arc::new(PolicyCorpus::new(6).with_document("gdpr.md", GDPR_POLICY));
    let critic = Critic::new(CriticConfig::for_domain(Domain::Masking, 0.70), corpus)
        .with_invariants(Domain::Masking.invariants());
    let query = Domain::Masking.evidence_query("customers.json");

    let mut before = profile(0, 0);
    before.invalids.insert("email_plaintext_count".to_string(), 4);
    before.invalids.insert("phone_plaintext_count".to_string(), 4);

    let mut partial = before.clone();
    partial.invalids.insert("phone_plaintext_count".to_string(), 0);
    // GDPR-P2 is not in the corpus, so only the email invariant is in force
    let verdict = critic.validate_outcome(&before, &partial, &query).await;
    assert!(!verdict.accepted);
    assert!(verdict.notes.iter().any(|n| n.contains("GDPR-P1")));

    let mut masked = before.clone();
    masked.invalids.insert("email_plaintext_count".to_string(), 0);
    let verdict = critic.validate_outcome(&before, &masked, &query).await;
    assert!(verdict.accepted);
}
