//! Example reviewing a hand-written proposal with the critic
//!
//! No LLM is involved: the proposal is built in code, the policy corpus is
//! read from the repository's `policies/` directory, and nothing is executed.
//!
//! Run with: cargo run --example critic_review

use sdk::{Action, Profiler, ReviewReport};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use warden_engine::corpus::PolicyCorpus;
use warden_engine::critic::{Critic, CriticConfig, DEFAULT_CONFIDENCE_THRESHOLD};
use warden_engine::dataset::{Table, TableProfiler};
use warden_engine::domain::Domain;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Critic Review Example ===\n");

    let table = Table::from_value(json!([
        {"id": 1, "email": "alice@example.com", "price": 12},
        {"id": 1, "email": "alice@example.com", "price": 12},
        {"id": 2, "email": "bob(at)example.com", "price": -3}
    ]))?;

    let domain = Domain::Cleaning;
    let profile = TableProfiler::for_domain(domain)?.analyze(&table)?;
    println!("Badness score: {}\n", profile.badness_score());

    let policy_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../policies");
    let corpus = Arc::new(PolicyCorpus::load_dir(&policy_dir, 6)?);
    println!("Loaded {} policy snippet(s)", corpus.len());

    let critic = Critic::new(
        CriticConfig::for_domain(domain, DEFAULT_CONFIDENCE_THRESHOLD),
        corpus,
    );

    let actions = vec![
        Action::new("FX001", "drop_duplicates", 0.92)
            .with_param("subset", json!(["id"]))
            .with_evidence("RAG-P4", "Remove duplicate rows based on unique identifiers"),
        Action::new("FX002", "remove_negative_values", 0.55)
            .with_param("column", json!("price"))
            .with_evidence("RAG-P5", "no negative values unless explicitly allowed"),
        Action::new("FX003", "regex_clean", 0.9)
            .with_param("column", json!("email"))
            .with_param("pattern", json!(r"\(at\)"))
            .with_param("repl", json!("@"))
            .with_evidence("RAG-P9", "Obfuscated emails may be repaired"),
    ];

    let query = domain.evidence_query("customers.json");
    let decision = critic.validate(&profile, &actions, &query).await;

    let review = ReviewReport {
        run_id: "example".to_string(),
        attempt: 0,
        decision,
        proposed: actions,
        to_execute: Vec::new(),
        open_questions: Vec::new(),
    };
    println!("\n{}", review.render_text());

    Ok(())
}
