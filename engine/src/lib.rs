//! Warden Engine Library
//!
//! This library provides the critic, the safety-gated orchestrator and the
//! reference collaborators of the warden controller. It is used by both the
//! main binary and integration tests.

/// Checkpoint and restore of the live dataset
pub mod backup;

/// CLI interface module
pub mod cli;

/// Conductor orchestration module
pub mod conductor;

/// Configuration management module
pub mod config;

/// Policy document corpus
pub mod corpus;

/// Deterministic validation gate
pub mod critic;

/// JSON table datasets, profiling and execution
pub mod dataset;

/// Database persistence module
pub mod db;

/// Domain presets and known policies
pub mod domain;

/// Command handlers module
pub mod handlers;

/// LLM provider abstraction layer
pub mod llm;

/// Telemetry and Observability
pub mod telemetry;
