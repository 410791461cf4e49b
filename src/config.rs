//! Configuration management for the meal assistant.
//!
//! Handles loading configuration from TOML files and environment variables,
//! covering the LLM provider, the meal database, agent limits, logging and
//! chat presentation.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// DashScope OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// File name of the meal database.
const DEFAULT_DB_FILE: &str = "healthMealAssistant.db";

/// Environment variables consulted for the API key, in order.
const API_KEY_ENV_VARS: [&str; 3] = [
    "MEAL_ASSISTANT_API_KEY",
    "DASHSCOPE_API_KEY",
    "OPENAI_API_KEY",
];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Meal database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Workflow limits and prompt location.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Transcript and log file settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Chat presentation settings.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "openai" (any OpenAI-compatible endpoint) or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name (e.g., "qwen-max", "gpt-4o").
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (prefer the environment over storing it here).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Stream free-text responses instead of waiting for the whole body.
    #[serde(default = "default_true")]
    pub streaming: bool,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "qwen-max".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
            streaming: true,
        }
    }
}

impl LlmConfig {
    /// Resolves the API key: config value first, then environment variables.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            })
    }
}

/// Meal database configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Returns the configured path or the platform default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("meal-assistant")
                .join(DEFAULT_DB_FILE)
        })
    }
}

/// Workflow limits and prompt location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum node transitions per turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Free-text answers shorter than this (in characters) are regenerated once.
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,

    /// Directory holding prompt templates. Built-in templates fill any gaps.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,

    /// Allow DROP / ALTER / TRUNCATE statements generated by the model.
    #[serde(default)]
    pub allow_schema_changes: bool,
}

fn default_max_steps() -> usize {
    100
}

fn default_min_answer_chars() -> usize {
    6
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            min_answer_chars: default_min_answer_chars(),
            prompts_dir: None,
            allow_schema_changes: false,
        }
    }
}

/// Transcript and log file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append every rendered prompt and response to the transcript log.
    #[serde(default = "default_true")]
    pub transcript: bool,

    /// Directory for log files. Defaults to the platform state directory.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            transcript: true,
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Returns the configured log directory or the platform default.
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(crate::logging::default_log_dir)
    }
}

/// Chat presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Reply style: 轻松, 幽默 or 正式.
    #[serde(default = "default_style")]
    pub style: String,

    /// Number of exchanges kept in the session history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_style() -> String {
    "轻松".to_string()
}

fn default_history_limit() -> usize {
    20
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            style: default_style(),
            history_limit: default_history_limit(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meal-assistant")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AssistantError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            AssistantError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.llm.base_url).map_err(|e| {
            AssistantError::config(format!("Invalid llm.base_url '{}': {e}", self.llm.base_url))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AssistantError::config(format!(
                "Invalid scheme '{}' in llm.base_url. Expected 'http' or 'https'",
                url.scheme()
            )));
        }
        if self.agent.max_steps == 0 {
            return Err(AssistantError::config("agent.max_steps must be at least 1"));
        }
        Ok(())
    }
}
