//! Proposal generator
//!
//! Turns a profile and a checklist into candidate actions using the LLM. The
//! prompt carries the inventory of known policies present in the corpus so
//! the model can cite exact phrases. The reply is schema-checked here; the
//! critic still verifies every citation independently.

use async_trait::async_trait;
use sdk::{Action, EngineError, EvidenceCorpus, FollowUp, Profile, Proposal, ProposalGenerator};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{policies_in, Domain};
use crate::llm::{extract_json_object, LLMProvider, Message};

/// Keys accepted for the action list, in order of preference
const ACTION_LIST_KEYS: [&str; 2] = ["proposed_actions", "proposed_fixes"];

/// Fields every proposed action must carry
const REQUIRED_FIELDS: [&str; 3] = ["id", "params", "confidence"];

const CLEANING_RULES: &str = "\
- drop_duplicates -> params: { \"subset\": [\"colname\"] }
- impute_nulls -> params: { \"column\": \"colname\", \"strategy\": \"mean|median|constant\", \"value\": \"\" }
- normalize_email -> params: { \"column\": \"email\" }
- regex_clean -> params: { \"column\": \"colname\", \"pattern\": \"regex\", \"repl\": \"\" }
- remove_negative_values -> params: { \"column\": \"price\" }";

const MASKING_RULES: &str = "\
- mask_email -> params: { \"column\": \"email\" }
- mask_phone -> params: { \"column\": \"phone\" }
- hash_name -> params: { \"column\": \"name\", \"salt\": \"\" }
- redact_address -> params: { \"column\": \"address\" }
- mask_column -> params: { \"column\": \"colname\" }";

/// LLM-backed proposal generator
pub struct LlmProposalGenerator {
    llm: Arc<dyn LLMProvider>,
    corpus: Arc<dyn EvidenceCorpus>,
    domain: Domain,
    dataset: String,
}

impl LlmProposalGenerator {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        corpus: Arc<dyn EvidenceCorpus>,
        domain: Domain,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            corpus,
            domain,
            dataset: dataset.into(),
        }
    }

    fn system_prompt(&self) -> String {
        let (role, rules) = match self.domain {
            Domain::Cleaning => ("Data Quality Reasoner", CLEANING_RULES),
            Domain::Masking => ("Privacy Masking Reasoner", MASKING_RULES),
        };
        let kinds: Vec<String> = self.domain.allowed_actions().into_iter().collect();

        format!(
            "You are the {role}.\n\
             Propose conservative actions for the dataset described by the profile.\n\
             Output ONLY a JSON object with this exact shape:\n\
             {{\n \"proposed_actions\": [\n  {{\n   \"id\": \"FX001\",\n   \"action\": \"{first}\",\n   \
             \"description\": \"...\",\n   \"params\": {{ \"column\": \"...\" }},\n   \
             \"policy_refs\": [{{ \"policy_id\": \"...\", \"quote\": \"exact policy text\" }}],\n   \
             \"confidence\": 0.9\n  }}\n ],\n \"questions_to_user\": []\n}}\n\n\
             Allowed actions: {kinds}\n\
             Mandatory params by action:\n{rules}\n\n\
             Rules:\n\
             - params must name columns that exist in the profile\n\
             - policy_refs must quote the policy inventory exactly\n\
             - if no policy supports a needed action, do not propose it; ask in questions_to_user\n\
             - no markdown, no commentary",
            role = role,
            first = kinds.first().map(String::as_str).unwrap_or("..."),
            kinds = kinds.join(", "),
            rules = rules,
        )
    }

    fn user_prompt(
        &self,
        profile: &Profile,
        steps: &[String],
        feedback: &[FollowUp],
        corpus: &str,
    ) -> Result<String, EngineError> {
        let inventory: Vec<String> = policies_in(self.domain, corpus)
            .into_iter()
            .map(|p| format!("{}: {}", p.id, p.phrase))
            .collect();
        let inventory = if inventory.is_empty() {
            "No direct policy quotes found.".to_string()
        } else {
            inventory.join("\n")
        };

        let mut prompt = format!(
            "DATASET PROFILE:\n{}\n\nPLANNER STEPS:\n{}\n\nMATCHED_POLICY_INVENTORY:\n{}\n\nRAG_SNIPPETS:\n{}\n",
            serde_json::to_string_pretty(profile)?,
            serde_json::to_string_pretty(steps)?,
            inventory,
            corpus.trim()
        );

        if !feedback.is_empty() {
            prompt.push_str("\nCRITIC FEEDBACK ON YOUR PREVIOUS PROPOSAL:\n");
            for follow_up in feedback {
                prompt.push_str(&format!("- {}: {}\n", follow_up.action_id, follow_up.reason));
            }
            prompt.push_str("Revise or drop the rejected actions.\n");
        }

        Ok(prompt)
    }
}

/// Schema-check a generator reply and build the proposal
///
/// The whole reply is rejected if any entry is malformed; a partially valid
/// batch is never returned.
pub fn parse_proposal(value: &Value) -> Result<Proposal, EngineError> {
    let object = value
        .as_object()
        .ok_or_else(|| EngineError::Proposal("reply is not a JSON object".to_string()))?;

    let entries = ACTION_LIST_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .ok_or_else(|| EngineError::Proposal("missing 'proposed_actions'".to_string()))?
        .as_array()
        .ok_or_else(|| EngineError::Proposal("'proposed_actions' is not a list".to_string()))?;

    let mut actions = Vec::with_capacity(entries.len());
    let mut ids = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let fields = entry
            .as_object()
            .ok_or_else(|| EngineError::Proposal(format!("entry {} is not an object", index)))?;

        for field in REQUIRED_FIELDS {
            if !fields.contains_key(field) {
                return Err(EngineError::Proposal(format!(
                    "entry {} is missing '{}'",
                    index, field
                )));
            }
        }
        for (field, alias) in [("action", "kind"), ("policy_refs", "evidence")] {
            if !fields.contains_key(field) && !fields.contains_key(alias) {
                return Err(EngineError::Proposal(format!(
                    "entry {} is missing '{}'",
                    index, field
                )));
            }
        }

        let action: Action = serde_json::from_value(entry.clone())
            .map_err(|e| EngineError::Proposal(format!("entry {}: {}", index, e)))?;

        if action.id.trim().is_empty() {
            return Err(EngineError::Proposal(format!("entry {} has an empty id", index)));
        }
        if !ids.insert(action.id.clone()) {
            return Err(EngineError::Proposal(format!(
                "duplicate action id '{}'",
                action.id
            )));
        }
        actions.push(action);
    }

    let open_questions = object
        .get("questions_to_user")
        .and_then(Value::as_array)
        .map(|questions| {
            questions
                .iter()
                .filter_map(|q| match q {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("question").and_then(Value::as_str).map(String::from),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Proposal {
        actions,
        open_questions,
    })
}

#[async_trait]
impl ProposalGenerator for LlmProposalGenerator {
    async fn propose(
        &self,
        profile: &Profile,
        steps: &[String],
        feedback: &[FollowUp],
    ) -> Result<Proposal, EngineError> {
        let query = self.domain.evidence_query(&self.dataset);
        let corpus = match self.corpus.fetch(&query).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Evidence corpus unavailable for proposal prompt: {}", e);
                String::new()
            }
        };

        let messages = [
            Message::system(self.system_prompt()),
            Message::user(self.user_prompt(profile, steps, feedback, &corpus)?),
        ];

        let content = self.llm.generate(&messages).await?;
        let value = extract_json_object(&content)
            .ok_or_else(|| EngineError::Proposal("no JSON object in reply".to_string()))?;
        let proposal = parse_proposal(&value)?;

        debug!(
            "Generator proposed {} action(s), {} question(s)",
            proposal.actions.len(),
            proposal.open_questions.len()
        );
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_proposal_accepts_fix_aliases() {
        let reply = json!({
            "proposed_fixes": [{
                "id": "FX001",
                "action": "drop_duplicates",
                "description": "Remove duplicate rows based on id",
                "params": {"subset": ["id"]},
                "policy_refs": [{"policy_id": "RAG-P4", "quote": "Remove duplicate rows"}],
                "confidence": 0.9
            }],
            "questions_to_user": [{"question": "Is price allowed to be negative?", "related_columns": []}, "Keep nulls?"]
        });

        let proposal = parse_proposal(&reply).unwrap();
        assert_eq!(proposal.actions[0].kind, "drop_duplicates");
        assert_eq!(proposal.actions[0].evidence[0].policy_id, "RAG-P4");
        assert_eq!(proposal.open_questions.len(), 2);
    }

    #[test]
    fn test_parse_proposal_rejects_missing_fields() {
        let reply = json!({
            "proposed_actions": [{"id": "FX001", "action": "drop_duplicates", "confidence": 0.9}]
        });
        let err = parse_proposal(&reply).unwrap_err();
        assert!(err.to_string().contains("missing 'params'"));
    }

    #[test]
    fn test_parse_proposal_rejects_duplicate_ids() {
        let entry = json!({
            "id": "FX001", "action": "mask_email", "params": {"column": "email"},
            "policy_refs": [], "confidence": 0.9
        });
        let reply = json!({"proposed_actions": [entry.clone(), entry]});
        assert!(matches!(parse_proposal(&reply), Err(EngineError::Proposal(_))));
    }

    #[test]
    fn test_parse_proposal_requires_action_list() {
        assert!(parse_proposal(&json!({"steps": []})).is_err());
        assert!(parse_proposal(&json!({"proposed_actions": {}})).is_err());
    }
}
