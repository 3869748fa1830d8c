//! JSON dataset collaborators
//!
//! Reference implementations of the dataset-facing ports. A dataset is a JSON
//! array of flat objects (`Table`); it is profiled by `TableProfiler`, mutated
//! by `TableExecutor`, and persisted by `JsonFileStore`.

pub mod executor;
pub mod profiler;

pub use executor::TableExecutor;
pub use profiler::TableProfiler;

use sdk::{DatasetStore, EngineError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One record of a table
pub type Row = Map<String, Value>;

/// A dataset held in memory as a list of flat JSON objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Parse a JSON array of objects
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text)
            .map_err(|e| EngineError::Dataset(format!("Expected a JSON array of objects: {}", e)))
    }

    /// Build a table from a `serde_json::json!` array literal
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        serde_json::from_value(value)
            .map_err(|e| EngineError::Dataset(format!("Expected a JSON array of objects: {}", e)))
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of keys across all rows
    pub fn columns(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.rows.iter().any(|row| row.contains_key(name))
    }

    /// Read a table from a JSON file
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::Dataset(format!("Failed to read dataset: {}", e)))?;
        Self::from_json_str(&text)
    }

    /// Write the table to `path` atomically
    ///
    /// The content is written to a temporary file in the same directory and
    /// renamed over the destination, so readers never see a partial file.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
            .map_err(|e| EngineError::Dataset(format!("Failed to write dataset: {}", e)))
    }
}

/// Replace `path` with `bytes` via a sibling temp file and a rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("dataset");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// `DatasetStore` over a single JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatasetStore<Table> for JsonFileStore {
    fn name(&self) -> String {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("dataset")
            .to_string()
    }

    fn load(&self) -> Result<Table, EngineError> {
        Table::load(&self.path)
    }

    fn write(&self, dataset: &Table) -> Result<(), EngineError> {
        dataset.save(&self.path)
    }
}

/// Textual form of a cell, `None` for nulls
///
/// A missing key, JSON null, or a blank string all count as null.
pub(crate) fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric form of a cell, parsing numeric strings
pub(crate) fn cell_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
