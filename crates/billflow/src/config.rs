//! Application configuration.
//!
//! All tunables are explicit values passed into each component at
//! construction time; nothing reads from a global cache. The JSON loader
//! applies serde defaults so a minimal config file is enough to start.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Upload validation limits, enforced before any bytes hit storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_oms_timeout_secs() -> u64 {
    30
}

/// Order-management service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmsConfig {
    pub base_url: String,
    /// Bearer token for the order service. Never logged.
    pub auth_token: Option<String>,
    #[serde(default = "default_oms_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

/// Prompt and model selection for one reasoning operation.
///
/// A `None` prompt means the built-in default for that operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

// Keeps an omitted section equivalent to an empty `{}` one: both land on
// the default model.
impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            prompt: None,
            model: default_model(),
        }
    }
}

impl PromptConfig {
    /// The configured prompt, or the operation's built-in default.
    pub fn text_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.prompt.as_deref().unwrap_or(default)
    }
}

fn default_reasoning_timeout_secs() -> u64 {
    60
}

/// Reasoning (vision/LLM) service endpoint and per-operation prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub base_url: String,
    /// API key for the reasoning service. Never logged.
    pub api_key: Option<String>,
    #[serde(default = "default_reasoning_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub classification: PromptConfig,
    #[serde(default)]
    pub extraction: PromptConfig,
    /// Doc-type specific extraction prompt overrides. When unset, the
    /// generic extraction prompt is used.
    #[serde(default)]
    pub bill_extraction_prompt: Option<String>,
    #[serde(default)]
    pub eway_bill_extraction_prompt: Option<String>,
    #[serde(default)]
    pub item_match: PromptConfig,
}

impl ReasoningConfig {
    /// Effective extraction prompt config for a document type: the
    /// type-specific override when present, otherwise the generic one.
    pub fn extraction_for(&self, doc_type: crate::model::DocType) -> PromptConfig {
        let override_prompt = match doc_type {
            crate::model::DocType::Bill => self.bill_extraction_prompt.clone(),
            crate::model::DocType::EwayBill => self.eway_bill_extraction_prompt.clone(),
            crate::model::DocType::Unknown => None,
        };
        match override_prompt {
            Some(prompt) => PromptConfig {
                prompt: Some(prompt),
                model: self.extraction.model.clone(),
            },
            None => self.extraction.clone(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.60
}

fn default_cross_hsn_min_confidence() -> f64 {
    0.85
}

fn default_similarity_floor() -> f64 {
    0.40
}

/// Thresholds for the reconciliation engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum confidence for accepting any candidate match.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Higher bar for candidates whose HSN/SAC codes disagree.
    #[serde(default = "default_cross_hsn_min_confidence")]
    pub cross_hsn_min_confidence: f64,
    /// Name-similarity floor below which the lexical matcher does not
    /// even propose a candidate.
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            cross_hsn_min_confidence: default_cross_hsn_min_confidence(),
            similarity_floor: default_similarity_floor(),
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for stored uploads and page blobs.
    pub storage_root: PathBuf,
    /// SQLite database path; `None` means the per-user default location.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub intake: IntakeConfig,
    pub oms: OmsConfig,
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.intake.max_upload_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "intake.max_upload_bytes must be positive".to_string(),
        });
    }

    if config.intake.allowed_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "intake.allowed_extensions must not be empty".to_string(),
        });
    }

    for threshold in [
        ("matching.min_confidence", config.matching.min_confidence),
        (
            "matching.cross_hsn_min_confidence",
            config.matching.cross_hsn_min_confidence,
        ),
        ("matching.similarity_floor", config.matching.similarity_floor),
    ] {
        if !(0.0..=1.0).contains(&threshold.1) {
            return Err(ConfigError::Validation {
                message: format!("{} must be within [0, 1]", threshold.0),
            });
        }
    }

    if config.matching.cross_hsn_min_confidence < config.matching.min_confidence {
        return Err(ConfigError::Validation {
            message: "matching.cross_hsn_min_confidence must not be below matching.min_confidence"
                .to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> &'static str {
        r#"
        {
            "storage_root": "/var/lib/billflow/storage",
            "oms": { "base_url": "https://oms.example.com/api/v1" },
            "reasoning": { "base_url": "https://llm.example.com/v1" }
        }
        "#
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let config = load_config_from_str(minimal_config()).unwrap();
        assert_eq!(config.intake.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(
            config.intake.allowed_extensions,
            vec!["png", "jpg", "jpeg", "pdf"]
        );
        assert!(config.worker_count >= 1);
        assert_eq!(config.matching.min_confidence, 0.60);
        assert_eq!(config.matching.cross_hsn_min_confidence, 0.85);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.oms.auth_token.is_none());
    }

    #[test]
    fn test_omitted_prompt_sections_get_default_model() {
        let config = load_config_from_str(minimal_config()).unwrap();
        assert_eq!(config.reasoning.classification.model, "gpt-4o");
        assert_eq!(config.reasoning.extraction.model, "gpt-4o");
        assert_eq!(config.reasoning.item_match.model, "gpt-4o");

        // An explicit empty section behaves the same as an omitted one.
        let json = r#"
        {
            "storage_root": "/tmp/s",
            "oms": { "base_url": "http://x" },
            "reasoning": { "base_url": "http://y", "classification": {} }
        }
        "#;
        let config = load_config_from_str(json).unwrap();
        assert_eq!(config.reasoning.classification.model, "gpt-4o");
    }

    #[test]
    fn test_rejects_zero_workers() {
        let json = r#"
        {
            "storage_root": "/tmp/s",
            "worker_count": 0,
            "oms": { "base_url": "http://x" },
            "reasoning": { "base_url": "http://y" }
        }
        "#;
        assert!(load_config_from_str(json).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let json = r#"
        {
            "storage_root": "/tmp/s",
            "oms": { "base_url": "http://x" },
            "reasoning": { "base_url": "http://y" },
            "matching": { "min_confidence": 1.5 }
        }
        "#;
        assert!(load_config_from_str(json).is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let json = r#"
        {
            "storage_root": "/tmp/s",
            "oms": { "base_url": "http://x" },
            "reasoning": { "base_url": "http://y" },
            "matching": { "min_confidence": 0.9, "cross_hsn_min_confidence": 0.7 }
        }
        "#;
        assert!(load_config_from_str(json).is_err());
    }

    #[test]
    fn test_extraction_prompt_override_per_doc_type() {
        let json = r#"
        {
            "storage_root": "/tmp/s",
            "oms": { "base_url": "http://x" },
            "reasoning": {
                "base_url": "http://y",
                "bill_extraction_prompt": "bill-specific prompt"
            }
        }
        "#;
        let config = load_config_from_str(json).unwrap();
        let bill = config.reasoning.extraction_for(crate::model::DocType::Bill);
        assert_eq!(bill.prompt.as_deref(), Some("bill-specific prompt"));
        let eway = config
            .reasoning
            .extraction_for(crate::model::DocType::EwayBill);
        assert!(eway.prompt.is_none());
    }
}
