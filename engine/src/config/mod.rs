//! Configuration management
//!
//! This module handles loading, validation, and management of the warden
//! configuration. Configuration is stored in TOML format at
//! ~/.warden/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory and log level
//! - **gate**: Domain preset, confidence threshold, allow-list override
//! - **orchestrator**: Safety mode, retry bound, collaborator timeout
//! - **corpus**: Policy document directory and retrieval depth
//! - **llm**: Ollama endpoint used by the planner and proposal generator
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Creates the data directory if it doesn't exist
//!
//! # Examples
//!
//! ```no_run
//! use warden_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Safety mode: {}", config.orchestrator.safety_mode);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::SafetyMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conductor::OrchestratorSettings;
use crate::corpus::DEFAULT_N_RESULTS;
use crate::critic::{CriticConfig, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::domain::Domain;

/// Main configuration structure
///
/// Every section falls back to its defaults when omitted from the file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Critic settings
    #[serde(default)]
    pub gate: GateConfig,

    /// Controller settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Policy corpus settings
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Critic configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Domain preset (cleaning, masking)
    #[serde(default)]
    pub domain: Domain,

    /// Minimum confidence for an action to pass (0.0-1.0)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Replaces the domain allow-list when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_actions: Option<Vec<String>>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            domain: Domain::default(),
            confidence_threshold: default_confidence_threshold(),
            allowed_actions: None,
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Safety mode (strict, adaptive, permissive)
    #[serde(default)]
    pub safety_mode: SafetyMode,

    /// Additional attempts after a failed outcome check, adaptive mode only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound on each planner or generator call (seconds)
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,

    /// Ask before executing accepted actions
    #[serde(default = "default_true")]
    pub require_confirmation: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            safety_mode: SafetyMode::default(),
            max_retries: default_max_retries(),
            collaborator_timeout_secs: default_collaborator_timeout(),
            require_confirmation: true,
        }
    }
}

/// Policy corpus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory of .md and .txt policy documents (supports ~ expansion)
    #[serde(default = "default_policy_dir")]
    pub policy_dir: PathBuf,

    /// Snippets returned per query
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            policy_dir: default_policy_dir(),
            n_results: default_n_results(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.warden")
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_max_retries() -> u32 {
    2
}

fn default_collaborator_timeout() -> u64 {
    300
}

fn default_policy_dir() -> PathBuf {
    PathBuf::from("~/.warden/policies")
}

fn default_n_results() -> usize {
    DEFAULT_N_RESULTS
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

impl Config {
    /// Load configuration from the default location (~/.warden/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    pub fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Written before path expansion so the file keeps the portable ~ form
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.warden/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".warden").join("config.toml"))
    }

    /// Path of the run history database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("warden.db")
    }

    /// Critic settings for the configured domain
    pub fn critic_config(&self) -> CriticConfig {
        let mut critic = CriticConfig::for_domain(self.gate.domain, self.gate.confidence_threshold);
        if let Some(kinds) = &self.gate.allowed_actions {
            critic.allowed_actions = kinds.iter().cloned().collect::<BTreeSet<_>>();
        }
        critic
    }

    /// Controller settings
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            domain: self.gate.domain,
            safety_mode: self.orchestrator.safety_mode,
            max_retries: self.orchestrator.max_retries,
            collaborator_timeout: Duration::from_secs(self.orchestrator.collaborator_timeout_secs),
        }
    }

    /// Validate and process configuration
    ///
    /// Expands ~ in paths and creates the data directory.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let threshold = self.gate.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(EngineError::Config(
                "confidence_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if let Some(kinds) = &self.gate.allowed_actions {
            if kinds.iter().all(|k| k.trim().is_empty()) {
                return Err(EngineError::Config(
                    "allowed_actions must name at least one action kind".to_string(),
                ));
            }
        }

        if self.orchestrator.collaborator_timeout_secs == 0 {
            return Err(EngineError::Config(
                "collaborator_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.corpus.n_results == 0 {
            return Err(EngineError::Config(
                "n_results must be at least 1".to_string(),
            ));
        }

        if self.llm.ollama.base_url.trim().is_empty() {
            return Err(EngineError::Config(
                "llm.ollama.base_url must not be empty".to_string(),
            ));
        }

        self.corpus.policy_dir = expand_path(&self.corpus.policy_dir)?;
        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.gate.domain, Domain::Cleaning);
        assert_eq!(config.gate.confidence_threshold, 0.70);
        assert_eq!(config.orchestrator.safety_mode, SafetyMode::Adaptive);
        assert_eq!(config.orchestrator.max_retries, 2);
        assert!(config.orchestrator.require_confirmation);
        assert_eq!(config.corpus.n_results, 6);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.gate.domain = Domain::Masking;
        config.gate.allowed_actions = Some(vec!["mask_email".to_string()]);
        config.orchestrator.safety_mode = SafetyMode::Strict;
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(deserialized.gate.domain, Domain::Masking);
        assert_eq!(deserialized.gate.allowed_actions, config.gate.allowed_actions);
        assert_eq!(deserialized.orchestrator.safety_mode, SafetyMode::Strict);
        assert_eq!(deserialized.llm.ollama.model, config.llm.ollama.model);
    }

    #[test]
    fn test_critic_config_applies_overrides() {
        let mut config = Config::default();
        config.gate.confidence_threshold = 0.5;
        config.gate.allowed_actions = Some(vec!["drop_duplicates".to_string()]);

        let critic = config.critic_config();
        assert_eq!(critic.confidence_threshold, 0.5);
        assert_eq!(critic.allowed_actions.len(), 1);
        assert!(critic.allowed_actions.contains("drop_duplicates"));
    }
}
