//! LLM Provider Abstraction Layer
//!
//! The planner and proposal generator talk to a language model through the
//! `LLMProvider` trait. The controller never trusts what comes back: replies
//! are parsed as JSON objects and schema-checked by the callers, and every
//! failure degrades into a fallback rather than an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for sdk::EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Timeout => sdk::EngineError::LLMTimeout,
            other => sdk::EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama")
    fn name(&self) -> &str;

    /// Generate a completion for the conversation
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}

/// Extract the first JSON object from free-form model output.
///
/// Handles:
/// 1. Raw JSON (the whole reply is an object)
/// 2. Fenced JSON, with or without trailing prose
/// 3. An object embedded in prose, from the first `{` to its matching `}`
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(inner.trim()) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let candidate = extract_balanced_json(&trimmed[start..])?;
    match serde_json::from_str(candidate) {
        Ok(value @ serde_json::Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Extract the body of the first markdown code fence in the text.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("You are the planner");
        assert_eq!(system_msg.role, MessageRole::System);
        assert_eq!(system_msg.role.to_string(), "system");
    }

    #[test]
    fn test_extract_raw_json() {
        let value = extract_json_object(r#"{"steps": ["null_check"]}"#).unwrap();
        assert_eq!(value["steps"][0], "null_check");
    }

    #[test]
    fn test_extract_fenced_json_with_trailing_prose() {
        let content = "Here you go:\n```json\n{\"steps\": [\"a\"]}\n```\nLet me know!";
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["steps"][0], "a");
    }

    #[test]
    fn test_extract_embedded_json_with_braces_in_strings() {
        let content = r#"Sure. {"note": "use {id}", "steps": []} trailing } text"#;
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["note"], "use {id}");
    }

    #[test]
    fn test_extract_rejects_non_objects() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{ broken").is_none());
    }

    #[test]
    fn test_timeout_maps_to_engine_timeout() {
        let err: sdk::EngineError = LLMError::Timeout.into();
        assert!(matches!(err, sdk::EngineError::LLMTimeout));
    }
}
