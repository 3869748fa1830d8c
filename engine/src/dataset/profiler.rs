//! Table profiler
//!
//! Computes the `Profile` the critic and orchestrator reason about: schema,
//! null counts, duplicate rows, and named defect metrics. The metrics are
//! what the badness score adds up, so every metric must be a count of
//! defects that an allowed action can reduce.

use regex::Regex;
use sdk::{EngineError, Profile, Profiler};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use super::{cell_number, cell_text, Table};
use crate::domain::Domain;

pub const EMAIL_INVALID: &str = "email_invalid_count";
pub const PHONE_INVALID: &str = "phone_invalid_count";
pub const PRICE_NEGATIVE: &str = "price_negative_count";
pub const EMAIL_PLAINTEXT: &str = "email_plaintext_count";
pub const PHONE_PLAINTEXT: &str = "phone_plaintext_count";

const EMAIL_PATTERN: &str = r"^[^@]+@[^@]+\.[^@]+";

/// Placeholders written by the masking actions
const MASK_PLACEHOLDERS: [&str; 2] = ["[MASKED]", "[REDACTED]"];

/// Profiler for `Table` datasets
#[derive(Debug, Clone)]
pub struct TableProfiler {
    email: Regex,
    sensitive_signals: bool,
}

impl TableProfiler {
    pub fn new() -> Result<Self, EngineError> {
        let email = Regex::new(EMAIL_PATTERN)
            .map_err(|e| EngineError::Profiler(format!("Invalid email pattern: {}", e)))?;
        Ok(Self {
            email,
            sensitive_signals: false,
        })
    }

    /// Also count plaintext emails and phone numbers
    pub fn with_sensitive_signals(mut self, enabled: bool) -> Self {
        self.sensitive_signals = enabled;
        self
    }

    pub fn for_domain(domain: Domain) -> Result<Self, EngineError> {
        Ok(Self::new()?.with_sensitive_signals(domain.sensitive_signals()))
    }

    fn is_email(&self, text: &str) -> bool {
        self.email.is_match(text)
    }
}

impl Profiler<Table> for TableProfiler {
    fn analyze(&self, table: &Table) -> Result<Profile, EngineError> {
        let columns = table.columns();
        let mut schema = BTreeMap::new();
        let mut null_counts = BTreeMap::new();

        for column in &columns {
            let values: Vec<Option<&Value>> =
                table.rows().iter().map(|row| row.get(column)).collect();
            schema.insert(column.clone(), infer_type(&values).to_string());
            let nulls = values.iter().filter(|v| cell_text(**v).is_none()).count();
            null_counts.insert(column.clone(), nulls as u64);
        }

        let mut invalids = BTreeMap::new();

        if columns.contains("email") {
            let texts = present_texts(table, "email");
            let invalid = texts
                .iter()
                .filter(|t| !is_masked(t) && !self.is_email(t))
                .count();
            invalids.insert(EMAIL_INVALID.to_string(), invalid as u64);

            if self.sensitive_signals {
                let plaintext = texts
                    .iter()
                    .filter(|t| !is_masked(t) && self.is_email(t))
                    .count();
                invalids.insert(EMAIL_PLAINTEXT.to_string(), plaintext as u64);
            }
        }

        if columns.contains("phone") {
            let texts = present_texts(table, "phone");
            let invalid = texts
                .iter()
                .filter(|t| !is_masked(t) && !is_valid_phone(t))
                .count();
            invalids.insert(PHONE_INVALID.to_string(), invalid as u64);

            if self.sensitive_signals {
                let plaintext = texts
                    .iter()
                    .filter(|t| !is_masked(t) && digit_count(t) >= 7)
                    .count();
                invalids.insert(PHONE_PLAINTEXT.to_string(), plaintext as u64);
            }
        }

        if columns.contains("price") {
            let negative = table
                .rows()
                .iter()
                .filter_map(|row| cell_number(row.get("price")))
                .filter(|n| *n < 0.0)
                .count();
            invalids.insert(PRICE_NEGATIVE.to_string(), negative as u64);
        }

        Ok(Profile {
            num_rows: table.len() as u64,
            schema,
            null_counts,
            dup_rows: duplicate_rows(table),
            invalids,
        })
    }
}

fn present_texts(table: &Table, column: &str) -> Vec<String> {
    table
        .rows()
        .iter()
        .filter_map(|row| cell_text(row.get(column)))
        .collect()
}

/// Rows equal to an earlier row
fn duplicate_rows(table: &Table) -> u64 {
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    for row in table.rows() {
        let canonical: BTreeMap<&String, &Value> = row.iter().collect();
        let key = serde_json::to_string(&canonical).unwrap_or_default();
        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    duplicates
}

fn infer_type(values: &[Option<&Value>]) -> &'static str {
    let mut inferred: Option<&'static str> = None;

    for value in values {
        let kind = match value {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "int64",
            Some(Value::Number(_)) => "float64",
            Some(Value::Bool(_)) => "bool",
            Some(Value::String(_)) => "string",
            Some(_) => return "mixed",
        };

        inferred = match (inferred, kind) {
            (None, kind) => Some(kind),
            (Some(a), b) if a == b => Some(a),
            (Some("int64"), "float64") | (Some("float64"), "int64") => Some("float64"),
            _ => return "mixed",
        };
    }

    inferred.unwrap_or("null")
}

fn is_masked(text: &str) -> bool {
    text.contains('*') || MASK_PLACEHOLDERS.contains(&text.trim())
}

fn digit_count(text: &str) -> usize {
    text.chars().filter(char::is_ascii_digit).count()
}

/// Digits, spaces, dashes, parentheses, dots and a leading plus; 7 to 15 digits
fn is_valid_phone(text: &str) -> bool {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let legal = body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'));
    let digits = digit_count(body);
    legal && (7..=15).contains(&digits)
}
