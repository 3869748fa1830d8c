//! Conductor Planner
//!
//! Asks the LLM for an ordered checklist of checks to run on a profile. The
//! planner never proposes fixes. Any failure falls back to the domain's
//! default checklist.

use async_trait::async_trait;
use sdk::{Checklist, EngineError, Planner, Profile};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::Domain;
use crate::llm::{extract_json_object, LLMProvider, Message};

/// Intermediate deserialization type for LLM JSON output
#[derive(Debug, Deserialize)]
struct RawChecklist {
    steps: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// LLM-backed planner
pub struct LlmPlanner {
    llm: Arc<dyn LLMProvider>,
    domain: Domain,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LLMProvider>, domain: Domain) -> Self {
        Self { llm, domain }
    }

    fn system_prompt(&self) -> String {
        let (role, example) = match self.domain {
            Domain::Cleaning => (
                "Data Quality Planner",
                r#"{ "steps": ["schema_check", "null_check", "duplicate_check", "format_check"], "notes": "" }"#,
            ),
            Domain::Masking => (
                "Privacy Planner",
                r#"{ "steps": ["schema_check", "email_regex", "phone_regex", "sensitive_terms_check"], "notes": "" }"#,
            ),
        };
        format!(
            "You are the {}. Produce a short ordered list of checks to run on the dataset \
             described by the profile.\n\
             Do NOT propose fixes. Only list the steps in order.\n\
             Output ONLY a JSON object, no markdown, no explanation. Example:\n{}",
            role, example
        )
    }

    /// Default checklist used on any failure
    pub fn fallback(&self) -> Checklist {
        Checklist {
            steps: self.domain.fallback_steps(),
            notes: "fallback plan".to_string(),
        }
    }

    /// Parse LLM output into a checklist
    fn parse_checklist(content: &str) -> Option<Checklist> {
        let value = extract_json_object(content)?;
        let raw: RawChecklist = serde_json::from_value(value).ok()?;

        let steps: Vec<String> = raw
            .steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if steps.is_empty() {
            return None;
        }

        Some(Checklist {
            steps,
            notes: raw.notes.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, profile: &Profile) -> Result<Checklist, EngineError> {
        let profile_json = serde_json::to_string_pretty(profile)?;
        let messages = [
            Message::system(self.system_prompt()),
            Message::user(format!(
                "DATASET PROFILE:\n{}\n\nReturn the JSON only.",
                profile_json
            )),
        ];

        let content = match self.llm.generate(&messages).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Planner LLM unavailable, using fallback plan: {}", e);
                return Ok(self.fallback());
            }
        };

        match Self::parse_checklist(&content) {
            Some(checklist) => {
                debug!("Planner produced {} step(s)", checklist.steps.len());
                Ok(checklist)
            }
            None => {
                warn!("Failed to parse planner output, using fallback plan");
                Ok(self.fallback())
            }
        }
    }
}
