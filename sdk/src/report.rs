//! Review report shown before the confirmation gate

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::types::{Action, FollowUpRoute, PlanDecision};

/// Accepted and rejected actions with rationale, for a human to review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub run_id: String,
    pub attempt: u32,
    pub decision: PlanDecision,
    pub proposed: Vec<Action>,

    /// The batch that will run if the gate approves
    pub to_execute: Vec<Action>,

    pub open_questions: Vec<String>,
}

impl ReviewReport {
    /// Plain-text rendering for terminals
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} (attempt {}): critic decision {:?}",
            self.run_id, self.attempt, self.decision.decision
        );

        for action in &self.proposed {
            let Some(verdict) = self.decision.verdict(&action.id) else {
                continue;
            };
            let _ = writeln!(
                out,
                "  [{}] {} {} (confidence {:.2})",
                if verdict.is_accepted() { "accepted" } else { "rejected" },
                action.id,
                action.kind,
                action.confidence
            );
            if !action.description.is_empty() {
                let _ = writeln!(out, "      {}", action.description);
            }
            for note in &verdict.notes {
                let _ = writeln!(out, "      - {}", note);
            }
            for reference in &verdict.confirmed {
                let _ = writeln!(out, "      cites {}: \"{}\"", reference.policy_id, reference.quote);
            }
        }

        for follow_up in &self.decision.follow_ups {
            let route = match follow_up.route {
                FollowUpRoute::AskHuman => "ask a human",
                FollowUpRoute::Replan => "re-plan",
            };
            let _ = writeln!(out, "  follow-up {} ({}): {}", follow_up.action_id, route, follow_up.reason);
        }

        for question in &self.open_questions {
            let _ = writeln!(out, "  question: {}", question);
        }

        let _ = write!(
            out,
            "{} of {} proposed action(s) will be applied",
            self.to_execute.len(),
            self.proposed.len()
        );
        out
    }
}
