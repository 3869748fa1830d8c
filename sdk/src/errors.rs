//! Error types and handling
//!
//! This module provides the error type shared by the warden engine and its
//! collaborators. All errors implement the `WardenErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! Validation rejections are not errors. A rejected action is reported through
//! a `Verdict`; only failures of the machinery itself end up here.
//!
//! # Security
//!
//! All hints are safe to display to end users:
//! - No file paths
//! - No dataset contents
//! - No provider credentials

use thiserror::Error;

/// Trait for warden error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait WardenErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or degraded. Non-recoverable errors
    /// mean the dataset could not be protected and need manual attention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: Run history persistence failures
/// - **Collaborators**: LLM, corpus and proposal failures (degraded, never fatal)
/// - **Dataset**: Loading, profiling and execution failures
/// - **Transaction**: Backup and restore failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, WardenErrorExt};
///
/// let error = EngineError::LLMTimeout;
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Restore("disk full".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Collaborator errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM call timed out")]
    LLMTimeout,

    #[error("Evidence corpus error: {0}")]
    Corpus(String),

    #[error("Invalid proposal: {0}")]
    Proposal(String),

    // Dataset errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Profiling failed: {0}")]
    Profiler(String),

    #[error("Action {action_id} failed: {reason}")]
    Execution { action_id: String, reason: String },

    // Transaction errors
    #[error("Backup failed: {0}")]
    Backup(String),

    #[error("Restore failed: {0}")]
    Restore(String),

    #[error("Checkpoint digest mismatch: expected {expected}, found {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Checkpoint belongs to another run: {0}")]
    ForeignCheckpoint(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for an execution failure tied to one action
    pub fn execution(action_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            action_id: action_id.into(),
            reason: reason.into(),
        }
    }
}

impl WardenErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::Database(_) => "Run history could not be stored. The run itself is unaffected",

            Self::LLMProvider(_) => "Proposal model unavailable. Check that Ollama is running",
            Self::LLMTimeout => "Proposal model took too long to respond. Try again",
            Self::Corpus(_) => "Policy documents could not be read. Check corpus.policy_dir",
            Self::Proposal(_) => "The generator returned output that could not be used",

            Self::Dataset(_) => "Dataset could not be read or written",
            Self::Profiler(_) => "Dataset could not be profiled",
            Self::Execution { .. } => "An action failed; the dataset was restored from backup",

            Self::Backup(_) => "Could not take a backup. No changes were made",
            Self::Restore(_) => "Restore from backup failed. Recover the dataset manually",
            Self::DigestMismatch { .. } => "Backup is corrupted. Recover the dataset manually",
            Self::ForeignCheckpoint(_) => "Refused to restore from another run's backup",

            Self::Serialization(_) => "Malformed JSON input",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Restore(_) | Self::DigestMismatch { .. } | Self::ForeignCheckpoint(_) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_names_action() {
        let err = EngineError::execution("FX002", "column 'price' missing");
        assert_eq!(err.to_string(), "Action FX002 failed: column 'price' missing");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_transaction_errors_not_recoverable() {
        let err = EngineError::DigestMismatch {
            expected: "blake3:aa".to_string(),
            actual: "blake3:bb".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(!EngineError::ForeignCheckpoint("run-1".to_string()).is_recoverable());
    }

    #[test]
    fn test_hints_do_not_leak_details() {
        let err = EngineError::Dataset("/home/alice/secret.json".to_string());
        assert!(!err.user_hint().contains("alice"));
    }
}
