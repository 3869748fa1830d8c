//! Integration tests for configuration loading

use sdk::{EngineError, SafetyMode};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use warden_engine::config::Config;
use warden_engine::domain::Domain;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_load_full_config_from_path() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let body = format!(
        r#"
[core]
data_dir = "{}"
log_level = "debug"

[gate]
domain = "masking"
confidence_threshold = 0.8
allowed_actions = ["mask_email", "mask_phone"]

[orchestrator]
safety_mode = "strict"
max_retries = 0
collaborator_timeout_secs = 30
require_confirmation = false

[corpus]
policy_dir = "/srv/policies"
n_results = 3

[llm.ollama]
base_url = "http://ollama.internal:11434"
model = "qwen2.5:7b"
"#,
        data_dir.display()
    );
    let path = write_config(&dir, &body);

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert!(data_dir.is_dir());
    assert_eq!(config.database_path(), data_dir.join("warden.db"));

    let critic = config.critic_config();
    assert_eq!(critic.confidence_threshold, 0.8);
    assert_eq!(critic.allowed_actions.len(), 2);

    let settings = config.orchestrator_settings();
    assert_eq!(settings.domain, Domain::Masking);
    assert_eq!(settings.safety_mode, SafetyMode::Strict);
    assert_eq!(settings.max_retries, 0);
    assert_eq!(settings.collaborator_timeout, Duration::from_secs(30));
    assert!(!config.orchestrator.require_confirmation);

    assert_eq!(config.corpus.n_results, 3);
    assert_eq!(config.llm.ollama.model, "qwen2.5:7b");
}

#[test]
fn test_missing_sections_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "[core]\ndata_dir = \"{}\"\n",
        dir.path().join("data").display()
    );
    let config = Config::from_toml_str(&body).unwrap();

    assert_eq!(config.gate.domain, Domain::Cleaning);
    assert_eq!(config.orchestrator.safety_mode, SafetyMode::Adaptive);
    assert_eq!(config.orchestrator.max_retries, 2);
    assert_eq!(config.critic_config().allowed_actions, Domain::Cleaning.allowed_actions());
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let core = format!("[core]\ndata_dir = \"{}\"\n", data_dir.display());

    let cases = [
        "[gate]\nconfidence_threshold = 1.5\n",
        "[gate]\nallowed_actions = [\"  \"]\n",
        "[orchestrator]\ncollaborator_timeout_secs = 0\n",
        "[corpus]\nn_results = 0\n",
        "[llm.ollama]\nbase_url = \"\"\n",
    ];
    for case in cases {
        let err = Config::from_toml_str(&format!("{}{}", core, case)).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)), "accepted: {}", case);
    }

    let err = Config::from_toml_str("[core]\nlog_level = \"loud\"\n").unwrap_err();
    assert!(err.to_string().contains("loud"));
}

#[test]
fn test_unknown_enum_values_fail_to_parse() {
    assert!(matches!(
        Config::from_toml_str("[orchestrator]\nsafety_mode = \"reckless\"\n"),
        Err(EngineError::Config(_))
    ));
    assert!(matches!(
        Config::from_toml_str("[gate]\ndomain = \"billing\"\n"),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn test_create_default_writes_loadable_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    Config::create_default(&path).unwrap();
    let written = fs::read_to_string(&path).unwrap();

    // Portable form is kept on disk
    assert!(written.contains("~/.warden"));
    let reloaded = Config::load_from_path(&path).unwrap();
    assert_eq!(reloaded.orchestrator.safety_mode, SafetyMode::Adaptive);
    assert!(!reloaded.core.data_dir.starts_with("~"));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}
