//! Configuration stored in `.saga/config.json`.
//!
//! Every field has a default, so a missing file or a partial file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_MODEL: &str = "SAGA_MODEL";
pub const ENV_AGENT_MODE: &str = "SAGA_AGENT_MODE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SagaConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Tool-calling mode and the per-run spend budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Agent (tool-calling) mode; `false` selects the single-shot prompt.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_diff_fetches")]
    pub max_diff_fetches: u32,
    #[serde(default = "default_max_diff_bytes")]
    pub max_diff_bytes: u64,
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: u64,
    /// Commit messages longer than this are truncated in the prompt.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_diff_fetches: default_max_diff_fetches(),
            max_diff_bytes: default_max_diff_bytes(),
            max_total_tokens: default_max_total_tokens(),
            max_message_chars: default_max_message_chars(),
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            max_output_tokens: default_max_output_tokens(),
            api_base: default_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    /// Display name; defaults to the directory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    #[serde(default = "default_remote")]
    pub remote: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            main_branch: default_main_branch(),
            remote: default_remote(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// Newest-N cap applied when a repository has no watermark yet.
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_commits: default_max_commits(),
        }
    }
}

impl SagaConfig {
    /// Load from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("invalid {}: {e}", path.display())))
    }

    /// Load from a file, then apply process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.model.name = model;
        }
        if let Some(flag) = lookup(ENV_AGENT_MODE) {
            self.agent.enabled = !matches!(flag.trim(), "0" | "false" | "off" | "no");
        }
    }
}

/// Read the model API credential. Missing or blank is a configuration error.
pub fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    match lookup(ENV_API_KEY) {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(Error::Configuration(format!("{ENV_API_KEY} is not set"))),
    }
}

fn default_true() -> bool {
    true
}
fn default_max_diff_fetches() -> u32 {
    5
}
fn default_max_diff_bytes() -> u64 {
    50_000
}
fn default_max_total_tokens() -> u64 {
    40_000
}
fn default_max_message_chars() -> usize {
    500
}
fn default_max_turns() -> u32 {
    25
}
fn default_model_name() -> String {
    "claude-sonnet-4-5".into()
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_api_base() -> String {
    "https://api.anthropic.com".into()
}
fn default_main_branch() -> String {
    "main".into()
}
fn default_remote() -> String {
    "origin".into()
}
fn default_max_commits() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SagaConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(cfg, SagaConfig::default());
        assert!(cfg.agent.enabled);
        assert_eq!(cfg.agent.max_diff_fetches, 5);
        assert_eq!(cfg.repository.main_branch, "main");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"agent": {"max_diff_fetches": 1, "enabled": false}, "repository": {"name": "web"}}"#,
        )
        .unwrap();
        let cfg = SagaConfig::load(&path).unwrap();
        assert_eq!(cfg.agent.max_diff_fetches, 1);
        assert!(!cfg.agent.enabled);
        assert_eq!(cfg.agent.max_diff_bytes, 50_000);
        assert_eq!(cfg.repository.name.as_deref(), Some("web"));
        assert_eq!(cfg.analysis.max_commits, 200);
    }

    #[test]
    fn invalid_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SagaConfig::load(&path),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> =
            [(ENV_MODEL, "other-model"), (ENV_AGENT_MODE, "false")].into();
        let mut cfg = SagaConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.model.name, "other-model");
        assert!(!cfg.agent.enabled);
    }

    #[test]
    fn api_key_required() {
        assert!(matches!(
            api_key_from(|_| None),
            Err(Error::Configuration(_))
        ));
        assert!(api_key_from(|_| Some("  ".into())).is_err());
        assert_eq!(api_key_from(|_| Some("sk-x".into())).unwrap(), "sk-x");
    }
}
