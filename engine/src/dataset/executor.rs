//! Table executor
//!
//! Applies accepted actions to a `Table`. The batch runs against a private
//! copy; the first failing action aborts the batch and the caller keeps its
//! original table untouched.

use regex::Regex;
use sdk::{Action, ActionExecutor, EngineError};
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

use super::{cell_number, cell_text, Table};

/// Length of the hex prefix kept by `hash_name`
const HASH_PREFIX_LEN: usize = 12;

/// Executor for every allow-listed action kind of both domains
#[derive(Debug, Clone, Default)]
pub struct TableExecutor;

impl TableExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ActionExecutor<Table> for TableExecutor {
    fn apply(&self, dataset: &Table, actions: &[Action]) -> Result<Table, EngineError> {
        let mut table = dataset.clone();
        for action in actions {
            apply_one(&mut table, action)?;
            debug!("Applied {} ({})", action.id, action.kind);
        }
        Ok(table)
    }
}

fn apply_one(table: &mut Table, action: &Action) -> Result<(), EngineError> {
    match action.kind.as_str() {
        "drop_duplicates" => drop_duplicates(table, action),
        "impute_nulls" => impute_nulls(table, action),
        "normalize_email" => {
            let column = action.param_str("column").unwrap_or("email");
            ensure_column(table, action, column)?;
            map_strings(table, column, |s| Value::String(s.trim().to_lowercase()));
            Ok(())
        }
        "regex_clean" => regex_clean(table, action),
        "remove_negative_values" => {
            let column = required_column(table, action)?;
            for row in table.rows_mut() {
                if let Some(cell) = row.get_mut(&column) {
                    if cell_number(Some(&*cell)).is_some_and(|v| v < 0.0) {
                        *cell = Value::Null;
                    }
                }
            }
            Ok(())
        }
        "mask_email" => {
            let column = required_column(table, action)?;
            map_strings(table, &column, |s| Value::String(mask_email(s)));
            Ok(())
        }
        "mask_phone" => {
            let column = required_column(table, action)?;
            map_present(table, &column, |text| Value::String(mask_phone(&text)));
            Ok(())
        }
        "hash_name" => {
            let column = required_column(table, action)?;
            let salt = action.param_str("salt").unwrap_or("").to_string();
            map_present(table, &column, |text| Value::String(hash_value(&text, &salt)));
            Ok(())
        }
        "redact_address" => {
            let column = required_column(table, action)?;
            map_present(table, &column, |_| Value::String("[REDACTED]".to_string()));
            Ok(())
        }
        "mask_column" => {
            let column = required_column(table, action)?;
            for row in table.rows_mut() {
                if let Some(cell) = row.get_mut(&column) {
                    if !cell.is_null() {
                        *cell = Value::String("[MASKED]".to_string());
                    }
                }
            }
            Ok(())
        }
        other => Err(EngineError::execution(
            &action.id,
            format!("unknown action kind '{}'", other),
        )),
    }
}

fn ensure_column(table: &Table, action: &Action, column: &str) -> Result<(), EngineError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(EngineError::execution(
            &action.id,
            format!("column '{}' not found", column),
        ))
    }
}

fn required_column(table: &Table, action: &Action) -> Result<String, EngineError> {
    let column = action
        .param_str("column")
        .ok_or_else(|| EngineError::execution(&action.id, "missing 'column' parameter"))?;
    ensure_column(table, action, column)?;
    Ok(column.to_string())
}

/// Rewrite every string cell of `column`
fn map_strings(table: &mut Table, column: &str, f: impl Fn(&str) -> Value) {
    for row in table.rows_mut() {
        if let Some(cell) = row.get_mut(column) {
            if let Some(s) = cell.as_str() {
                let updated = f(s);
                *cell = updated;
            }
        }
    }
}

/// Rewrite every non-null cell of `column` through its textual form
fn map_present(table: &mut Table, column: &str, f: impl Fn(String) -> Value) {
    for row in table.rows_mut() {
        if let Some(cell) = row.get_mut(column) {
            if let Some(text) = cell_text(Some(&*cell)) {
                *cell = f(text);
            }
        }
    }
}

fn drop_duplicates(table: &mut Table, action: &Action) -> Result<(), EngineError> {
    let subset: Vec<String> = match action.params.get("subset") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(name)) => vec![name.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(String::from).ok_or_else(|| {
                    EngineError::execution(&action.id, "'subset' must list column names")
                })
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(EngineError::execution(
                &action.id,
                "'subset' must be a column name or a list of names",
            ))
        }
    };
    for column in &subset {
        ensure_column(table, action, column)?;
    }

    let mut seen = HashSet::new();
    table.rows_mut().retain(|row| {
        let key = if subset.is_empty() {
            let canonical: std::collections::BTreeMap<&String, &Value> = row.iter().collect();
            serde_json::to_string(&canonical).unwrap_or_default()
        } else {
            let values: Vec<&Value> = subset
                .iter()
                .map(|c| row.get(c).unwrap_or(&Value::Null))
                .collect();
            serde_json::to_string(&values).unwrap_or_default()
        };
        seen.insert(key)
    });
    Ok(())
}

fn impute_nulls(table: &mut Table, action: &Action) -> Result<(), EngineError> {
    let column = required_column(table, action)?;
    let strategy = action.param_str("strategy").unwrap_or("constant");

    let mut numbers: Vec<f64> = table
        .rows()
        .iter()
        .filter_map(|row| cell_number(row.get(&column)))
        .collect();

    let constant = action
        .params
        .get("value")
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()));

    let fill = match strategy {
        "constant" => constant,
        "mean" | "median" if numbers.is_empty() => constant,
        "mean" => number_value(numbers.iter().sum::<f64>() / numbers.len() as f64),
        "median" => {
            numbers.sort_by(f64::total_cmp);
            let mid = numbers.len() / 2;
            let median = if numbers.len() % 2 == 0 {
                (numbers[mid - 1] + numbers[mid]) / 2.0
            } else {
                numbers[mid]
            };
            number_value(median)
        }
        other => {
            return Err(EngineError::execution(
                &action.id,
                format!("unknown impute strategy '{}'", other),
            ))
        }
    };

    for row in table.rows_mut() {
        if cell_text(row.get(&column)).is_none() {
            row.insert(column.clone(), fill.clone());
        }
    }
    Ok(())
}

fn number_value(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn regex_clean(table: &mut Table, action: &Action) -> Result<(), EngineError> {
    let column = required_column(table, action)?;
    let pattern = action
        .param_str("pattern")
        .ok_or_else(|| EngineError::execution(&action.id, "missing 'pattern' parameter"))?;
    let regex = Regex::new(pattern)
        .map_err(|e| EngineError::execution(&action.id, format!("invalid pattern: {}", e)))?;
    let repl = action.param_str("repl").unwrap_or("");

    map_strings(table, &column, |s| {
        Value::String(regex.replace_all(s, repl).into_owned())
    });
    Ok(())
}

/// Keep the first and last character of the local part
///
/// A one-character local part is replaced outright.
pub fn mask_email(value: &str) -> String {
    let Some((local, domain)) = value.split_once('@') else {
        return value.to_string();
    };
    let chars: Vec<char> = local.chars().collect();
    let masked = match chars.len() {
        0 => String::new(),
        1 => "*".to_string(),
        2 => format!("{}*", chars[0]),
        n => format!("{}{}{}", chars[0], "*".repeat(n - 2), chars[n - 1]),
    };
    format!("{}@{}", masked, domain)
}

/// Keep two leading and two trailing characters of the digits-and-plus form
pub fn mask_phone(value: &str) -> String {
    let kept: Vec<char> = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let n = kept.len();
    if n <= 4 {
        return "*".repeat(n);
    }
    let head: String = kept[..2].iter().collect();
    let tail: String = kept[n - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(n - 4), tail)
}

/// First 12 hex characters of sha256(value + salt)
pub fn hash_value(value: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_PREFIX_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("alice@example.com"), "a***e@example.com");
        assert_eq!(mask_email("al@example.com"), "a*@example.com");
        assert_eq!(mask_email("a@example.com"), "*@example.com");
        assert_eq!(mask_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+1 (555) 010-2000"), "+1********00");
        assert_eq!(mask_phone("12-3"), "***");
    }

    #[test]
    fn test_hash_value_is_salted_prefix() {
        let plain = hash_value("Alice", "");
        let salted = hash_value("Alice", "pepper");
        assert_eq!(plain.len(), 12);
        assert_ne!(plain, salted);
        assert_eq!(plain, hash_value("Alice", ""));
    }

    #[test]
    fn test_impute_median() {
        let table = Table::from_value(json!([{"age": 10}, {"age": 30}, {"age": null}, {"age": 20}]))
            .unwrap();
        let action = Action::new("FX001", "impute_nulls", 0.9)
            .with_param("column", json!("age"))
            .with_param("strategy", json!("median"));

        let out = TableExecutor::new().apply(&table, &[action]).unwrap();
        assert_eq!(out.rows()[2]["age"], json!(20.0));
    }

    #[test]
    fn test_unknown_kind_names_action() {
        let table = Table::from_value(json!([{"id": 1}])).unwrap();
        let err = TableExecutor::new()
            .apply(&table, &[Action::new("FX009", "drop_table", 0.9)])
            .unwrap_err();
        assert!(matches!(err, EngineError::Execution { ref action_id, .. } if action_id == "FX009"));
    }
}
