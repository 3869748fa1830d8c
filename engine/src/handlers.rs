//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Full controller run on a dataset
//! - profile: Profile a dataset
//! - validate: Critic-only review of a proposal file
//! - history: Show last N runs

use anyhow::{Context, Result};
use sdk::{
    Action, Confirmer, DatasetStore, Profiler, Proposal, ReviewReport, RunRecord, RunStatus,
    SafetyMode,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backup::FileBackupStore;
use crate::conductor::proposer::parse_proposal;
use crate::conductor::{
    AutoConfirm, Collaborators, LlmPlanner, LlmProposalGenerator, Orchestrator, RunReport,
    StdinConfirmer,
};
use crate::config::{expand_path, Config};
use crate::corpus::PolicyCorpus;
use crate::critic::Critic;
use crate::dataset::{JsonFileStore, Table, TableExecutor, TableProfiler};
use crate::db::Database;
use crate::domain::Domain;
use crate::llm::ollama::OllamaProvider;
use crate::llm::LLMProvider;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Per-invocation overrides of the `run` command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Option<SafetyMode>,
    pub domain: Option<Domain>,
    pub policies: Option<PathBuf>,
    pub yes: bool,
}

impl RunOptions {
    /// Configuration with the overrides applied
    pub fn apply(&self, config: &Config) -> Result<Config> {
        let mut config = config.clone();
        if let Some(mode) = self.mode {
            config.orchestrator.safety_mode = mode;
        }
        if let Some(domain) = self.domain {
            config.gate.domain = domain;
        }
        if let Some(dir) = &self.policies {
            config.corpus.policy_dir = expand_path(dir)?;
        }
        if self.yes {
            config.orchestrator.require_confirmation = false;
        }
        Ok(config)
    }
}

/// Run the controller on a dataset
///
/// Returns the terminal status so the caller can pick an exit code.
pub async fn handle_run(
    dataset: PathBuf,
    options: RunOptions,
    config: &Config,
    format: OutputFormat,
) -> Result<RunStatus> {
    let config = options.apply(config)?;
    let domain = config.gate.domain;

    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let llm: Arc<dyn LLMProvider> = Arc::new(OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
    ));

    let corpus = Arc::new(
        PolicyCorpus::load_dir(&config.corpus.policy_dir, config.corpus.n_results)
            .context("Failed to load policy corpus")?,
    );
    tracing::info!("Loaded {} policy snippet(s)", corpus.len());

    let store = Arc::new(JsonFileStore::new(dataset.clone()));
    let critic = Arc::new(
        Critic::new(config.critic_config(), corpus.clone())
            .with_invariants(domain.invariants()),
    );
    let confirmer: Arc<dyn Confirmer> = if config.orchestrator.require_confirmation {
        Arc::new(StdinConfirmer::new())
    } else {
        Arc::new(AutoConfirm::approve())
    };

    let collaborators = Collaborators {
        planner: Arc::new(LlmPlanner::new(Arc::clone(&llm), domain)),
        proposer: Arc::new(LlmProposalGenerator::new(
            Arc::clone(&llm),
            corpus,
            domain,
            store.name(),
        )),
        profiler: Arc::new(TableProfiler::for_domain(domain)?),
        executor: Arc::new(TableExecutor::new()),
        store,
        backups: Arc::new(FileBackupStore::in_data_dir(&dataset, &config.core.data_dir)),
        memory: Arc::new(database.runs()),
        confirmer,
    };

    let orchestrator = Orchestrator::new(critic, collaborators, config.orchestrator_settings());
    let report = orchestrator.run().await;

    if let Err(e) = database.close().await {
        tracing::warn!("Failed to close database cleanly: {:#}", e);
    }

    let report = report.context("Run did not complete")?;
    print_report(&report, format)?;

    Ok(report.status)
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

/// Profile a dataset and show its badness score
pub async fn handle_profile(
    dataset: PathBuf,
    domain: Option<Domain>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let domain = domain.unwrap_or(config.gate.domain);
    let table = Table::load(&dataset).context("Failed to load dataset")?;
    let profile = TableProfiler::for_domain(domain)?.analyze(&table)?;

    match format {
        OutputFormat::Text => {
            println!("Profile of {} ({} domain):", dataset.display(), domain);
            println!("  Rows: {}", profile.num_rows);
            println!("  Duplicate rows: {}", profile.dup_rows);
            println!("  Columns:");
            for (column, kind) in &profile.schema {
                let nulls = profile.null_counts.get(column).copied().unwrap_or(0);
                println!("    {} ({}), {} null", column, kind, nulls);
            }
            if !profile.invalids.is_empty() {
                println!("  Invalid metrics:");
                for (metric, count) in &profile.invalids {
                    println!("    {}: {}", metric, count);
                }
            }
            println!("  Badness score: {}", profile.badness_score());
        }
        OutputFormat::Json => {
            let output = json!({
                "dataset": dataset,
                "domain": domain,
                "profile": profile,
                "badness_score": profile.badness_score(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Review a proposal file against the policy corpus without mutating anything
pub async fn handle_validate(
    dataset: PathBuf,
    proposal: PathBuf,
    domain: Option<Domain>,
    policies: Option<PathBuf>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let options = RunOptions {
        domain,
        policies,
        ..RunOptions::default()
    };
    let config = options.apply(config)?;
    let domain = config.gate.domain;

    let table = Table::load(&dataset).context("Failed to load dataset")?;
    let profile = TableProfiler::for_domain(domain)?.analyze(&table)?;

    let proposal = read_proposal(&proposal)?;

    let corpus = Arc::new(
        PolicyCorpus::load_dir(&config.corpus.policy_dir, config.corpus.n_results)
            .context("Failed to load policy corpus")?,
    );
    let critic = Critic::new(config.critic_config(), corpus);
    let query = domain.evidence_query(&dataset_name(&dataset));
    let decision = critic.validate(&profile, &proposal.actions, &query).await;

    let to_execute: Vec<Action> = if decision.is_accept() {
        decision.accepted_actions(&proposal.actions)
    } else {
        Vec::new()
    };

    match format {
        OutputFormat::Text => {
            let review = ReviewReport {
                run_id: "dry-run".to_string(),
                attempt: 0,
                decision,
                proposed: proposal.actions,
                to_execute,
                open_questions: proposal.open_questions,
            };
            println!("{}", review.render_text());
        }
        OutputFormat::Json => {
            let output = json!({
                "dataset": dataset,
                "domain": domain,
                "decision": decision,
                "open_questions": proposal.open_questions,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn read_proposal(path: &Path) -> Result<Proposal> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read proposal file {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).context("Proposal file is not valid JSON")?;
    Ok(parse_proposal(&value)?)
}

fn dataset_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Show run history
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    let runs = database
        .runs()
        .recent(limit)
        .await
        .context("Failed to fetch run history")?;

    match format {
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No runs in history");
                return Ok(());
            }

            println!("Run History (last {} runs):", limit);
            println!();

            for run in &runs {
                print_record(run);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "runs": runs,
                "count": runs.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn print_record(run: &RunRecord) {
    let flag = if run.status == RunStatus::Committed && !run.compliant {
        " [NON-COMPLIANT]"
    } else {
        ""
    };
    println!("Run ID: {}", run.run_id);
    println!("  Dataset: {} ({} / {})", run.dataset, run.domain, run.safety_mode);
    println!("  Status: {}{}", run.status, flag);
    println!("  Attempts: {}", run.attempts);

    if !run.actions.is_empty() {
        let ids: Vec<&str> = run.actions.iter().map(|a| a.id.as_str()).collect();
        println!("  Executed: {}", ids.join(", "));
    }
    if !run.skipped.is_empty() {
        println!("  Skipped: {}", run.skipped.join(", "));
    }
    for note in &run.notes {
        println!("  - {}", note);
    }

    let created = chrono::DateTime::from_timestamp(run.timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    println!("  Created: {}", created);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_override_config() {
        let config = Config::default();
        let options = RunOptions {
            mode: Some(SafetyMode::Strict),
            domain: Some(Domain::Masking),
            policies: Some(PathBuf::from("/srv/policies")),
            yes: true,
        };

        let applied = options.apply(&config).unwrap();
        assert_eq!(applied.orchestrator.safety_mode, SafetyMode::Strict);
        assert_eq!(applied.gate.domain, Domain::Masking);
        assert_eq!(applied.corpus.policy_dir, PathBuf::from("/srv/policies"));
        assert!(!applied.orchestrator.require_confirmation);
    }

    #[test]
    fn test_dataset_name_is_file_name() {
        assert_eq!(dataset_name(Path::new("/data/customers.json")), "customers.json");
    }
}
