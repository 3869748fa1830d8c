//! Domain presets
//!
//! The controller is one machine parameterised by an allow-list, a fallback
//! checklist, an evidence query and a set of outcome invariants. A `Domain`
//! bundles those for the two supported workloads: cleaning data-quality
//! defects and masking personal data.
//!
//! The known-policy registry maps policy identifiers to their canonical
//! phrases. The critic uses it to decide which invariants the corpus asserts,
//! and the proposal generator uses it as a citation inventory.

use sdk::{CompliancePredicate, EvidenceReference, Profile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::critic::OutcomeInvariant;

/// A policy with a stable identifier and its exact wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPolicy {
    pub id: &'static str,
    pub phrase: &'static str,
    pub domain: Domain,
}

impl KnownPolicy {
    pub fn reference(&self) -> EvidenceReference {
        EvidenceReference::new(self.id, self.phrase)
    }
}

/// Canonical policy phrases, matched case-insensitively against the corpus
pub const KNOWN_POLICIES: &[KnownPolicy] = &[
    KnownPolicy {
        id: "RAG-P1",
        phrase: "Emails must follow the pattern: `username@domain.com`",
        domain: Domain::Cleaning,
    },
    KnownPolicy {
        id: "RAG-P2",
        phrase: "Phone numbers should include only valid characters (digits, spaces, dashes, parentheses).",
        domain: Domain::Cleaning,
    },
    KnownPolicy {
        id: "RAG-P3",
        phrase: "Required fields (e.g., email, phone) must not be null.",
        domain: Domain::Cleaning,
    },
    KnownPolicy {
        id: "RAG-P4",
        phrase: "Remove duplicate rows based on unique identifiers (e.g., `id`).",
        domain: Domain::Cleaning,
    },
    KnownPolicy {
        id: "RAG-P5",
        phrase: "Validate that numeric fields have no negative values unless explicitly allowed.",
        domain: Domain::Cleaning,
    },
    KnownPolicy {
        id: "RAG-P6",
        phrase: "Check that dates (e.g., `signup_date`) are not in the future.",
        domain: Domain::Cleaning,
    },
    KnownPolicy {
        id: "RAG-P7",
        phrase: "Null values should be imputed with appropriate defaults or flagged.",
        domain: Domain::Cleaning,
    },
    KnownPolicy {
        id: "GDPR-P1",
        phrase: "Personal identifiers such as email addresses must be masked before sharing.",
        domain: Domain::Masking,
    },
    KnownPolicy {
        id: "GDPR-P2",
        phrase: "Phone numbers must be masked so that only the first and last two digits remain visible.",
        domain: Domain::Masking,
    },
    KnownPolicy {
        id: "GDPR-P3",
        phrase: "Names of data subjects must be pseudonymised with a salted hash.",
        domain: Domain::Masking,
    },
    KnownPolicy {
        id: "GDPR-P4",
        phrase: "Postal addresses must be redacted in shared extracts.",
        domain: Domain::Masking,
    },
    KnownPolicy {
        id: "GDPR-P5",
        phrase: "Any other column classified as sensitive must be fully masked.",
        domain: Domain::Masking,
    },
];

/// Look up a known policy by identifier
pub fn known_policy(id: &str) -> Option<&'static KnownPolicy> {
    KNOWN_POLICIES.iter().find(|p| p.id == id)
}

/// Known policies of `domain` whose canonical phrase appears in the corpus text
pub fn policies_in(domain: Domain, corpus: &str) -> Vec<&'static KnownPolicy> {
    let corpus_lower = corpus.to_lowercase();
    KNOWN_POLICIES
        .iter()
        .filter(|p| p.domain == domain && corpus_lower.contains(&p.phrase.to_lowercase()))
        .collect()
}

/// Workload the controller is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Data-quality fixes: duplicates, nulls, malformed values
    #[default]
    Cleaning,
    /// Personal-data masking
    Masking,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Cleaning => "cleaning",
            Domain::Masking => "masking",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cleaning" => Some(Domain::Cleaning),
            "masking" => Some(Domain::Masking),
            _ => None,
        }
    }

    /// Action kinds the critic lets through
    pub fn allowed_actions(&self) -> BTreeSet<String> {
        let kinds: &[&str] = match self {
            Domain::Cleaning => &[
                "drop_duplicates",
                "impute_nulls",
                "normalize_email",
                "regex_clean",
                "remove_negative_values",
            ],
            Domain::Masking => &[
                "mask_email",
                "mask_phone",
                "hash_name",
                "redact_address",
                "mask_column",
            ],
        };
        kinds.iter().map(|k| k.to_string()).collect()
    }

    /// Checklist used when the planner is unavailable
    pub fn fallback_steps(&self) -> Vec<String> {
        let steps: &[&str] = match self {
            Domain::Cleaning => &["schema_check", "null_check", "duplicate_check", "format_check"],
            Domain::Masking => &[
                "schema_check",
                "email_regex",
                "phone_regex",
                "sensitive_terms_check",
            ],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }

    /// Corpus query for a dataset
    pub fn evidence_query(&self, dataset: &str) -> String {
        match self {
            Domain::Cleaning => format!("data quality best practices for dataset: {}", dataset),
            Domain::Masking => format!("privacy masking rules for dataset: {}", dataset),
        }
    }

    /// Whether the profiler should compute plaintext sensitive-value counts
    pub fn sensitive_signals(&self) -> bool {
        matches!(self, Domain::Masking)
    }

    /// Invariants re-checked after execution
    pub fn invariants(&self) -> Vec<OutcomeInvariant> {
        match self {
            Domain::Cleaning => vec![policy_invariant(
                "no negative prices",
                "price_negative_count",
                "RAG-P5",
            )],
            Domain::Masking => vec![
                policy_invariant("no plaintext emails", "email_plaintext_count", "GDPR-P1"),
                policy_invariant("no plaintext phones", "phone_plaintext_count", "GDPR-P2"),
            ],
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn policy_invariant(name: &str, metric: &str, policy_id: &str) -> OutcomeInvariant {
    let predicate = Arc::new(MetricMustBeZero::new(name, metric));
    match known_policy(policy_id) {
        Some(policy) => OutcomeInvariant::asserted_by(predicate, policy.reference()),
        None => OutcomeInvariant::always(predicate),
    }
}

/// Compliance predicate: a named invalid metric must be zero after execution
#[derive(Debug, Clone)]
pub struct MetricMustBeZero {
    name: String,
    metric: String,
}

impl MetricMustBeZero {
    pub fn new(name: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric: metric.into(),
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }
}

impl CompliancePredicate for MetricMustBeZero {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, after: &Profile) -> bool {
        after.invalid(&self.metric) == 0
    }
}
