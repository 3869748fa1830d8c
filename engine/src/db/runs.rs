/// Run history persistence
///
/// Append-only storage of `RunRecord`s. All queries are parameterized.
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::{EngineError, RunMemory, RunRecord, RunStatus, SafetyMode};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Run repository for database operations
#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    /// Create a new run repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a finished run
    pub async fn insert(&self, record: &RunRecord) -> Result<()> {
        let actions_json = serde_json::to_string(&record.actions)?;
        let skipped_json = serde_json::to_string(&record.skipped)?;
        let outcome_json = record
            .outcome
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let notes_json = serde_json::to_string(&record.notes)?;

        sqlx::query(
            "INSERT INTO runs (id, dataset, domain, safety_mode, status, compliant, attempts, \
             actions_json, skipped_json, outcome_json, notes_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.run_id)
        .bind(&record.dataset)
        .bind(&record.domain)
        .bind(record.safety_mode.as_str())
        .bind(record.status.as_str())
        .bind(record.compliant)
        .bind(record.attempts as i64)
        .bind(actions_json)
        .bind(skipped_json)
        .bind(outcome_json)
        .bind(notes_json)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to insert run record")?;

        Ok(())
    }

    /// Most recent runs, newest first
    pub async fn recent(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            "SELECT id, dataset, domain, safety_mode, status, compliant, attempts, actions_json, \
             skipped_json, outcome_json, notes_json, created_at \
             FROM runs ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch run history")?;

        rows.iter().map(record_from_row).collect()
    }

    /// Get a run by ID
    pub async fn get(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            "SELECT id, dataset, domain, safety_mode, status, compliant, attempts, actions_json, \
             skipped_json, outcome_json, notes_json, created_at FROM runs WHERE id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch run")?;

        row.as_ref().map(record_from_row).transpose()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let safety_mode: String = row.get("safety_mode");
    let status: String = row.get("status");
    let outcome_json: Option<String> = row.get("outcome_json");
    let attempts: i64 = row.get("attempts");

    Ok(RunRecord {
        run_id: row.get("id"),
        dataset: row.get("dataset"),
        domain: row.get("domain"),
        safety_mode: SafetyMode::parse(&safety_mode)
            .with_context(|| format!("Unknown safety mode '{}'", safety_mode))?,
        status: RunStatus::parse(&status)
            .with_context(|| format!("Unknown run status '{}'", status))?,
        compliant: row.get("compliant"),
        attempts: u32::try_from(attempts).unwrap_or(0),
        actions: serde_json::from_str(row.get("actions_json"))
            .context("Corrupt actions_json")?,
        skipped: serde_json::from_str(row.get("skipped_json"))
            .context("Corrupt skipped_json")?,
        outcome: outcome_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("Corrupt outcome_json")?,
        notes: serde_json::from_str(row.get("notes_json")).context("Corrupt notes_json")?,
        timestamp: row.get("created_at"),
    })
}

#[async_trait]
impl RunMemory for RunRepository {
    async fn append(&self, record: &RunRecord) -> std::result::Result<(), EngineError> {
        self.insert(record)
            .await
            .map_err(|e| EngineError::Database(format!("{:#}", e)))
    }
}
