//! Relay configuration
//!
//! Loaded from TOML; every field has a default so an empty file (or no file)
//! is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::chunk::DEFAULT_MAX_LEN;
use crate::completion::SamplingParams;
use crate::controller::ControllerConfig;
use crate::error::{RelayError, Result};
use crate::expiry::DEFAULT_IDLE_WINDOW;
use crate::memory::{BudgetPolicy, DEFAULT_BUDGET, DEFAULT_MIN_REMAINING_RATIO};
use crate::tokens::TokenCounter;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Token budget settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub budget: usize,
    pub min_remaining_ratio: f64,
    /// Model whose tokenizer and chat framing are used for counting
    pub counting_model: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            min_remaining_ratio: DEFAULT_MIN_REMAINING_RATIO,
            counting_model: "gpt-3.5-turbo-0301".to_string(),
        }
    }
}

/// Completion backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// OpenAI-compatible chat completions endpoint
    #[default]
    OpenAi,
    /// Offline echo client
    Echo,
}

/// Completion endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: CompletionProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            provider: CompletionProvider::OpenAi,
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            timeout_secs: 120,
        }
    }
}

/// Conversation handling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_chunk_len: usize,
    pub mention_idle_secs: u64,
    pub default_template: String,
    pub templates_dir: PathBuf,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: DEFAULT_MAX_LEN,
            mention_idle_secs: DEFAULT_IDLE_WINDOW.as_secs(),
            default_template: "default".to_string(),
            templates_dir: PathBuf::from("prompts"),
        }
    }
}

impl RelayConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RelayError::Config(format!("invalid config: {e}")))
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Reject values no relay can run with.
    pub fn validate(&self) -> Result<()> {
        if self.memory.budget == 0 {
            return Err(RelayError::Config("memory.budget must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.memory.min_remaining_ratio) {
            return Err(RelayError::Config(format!(
                "memory.min_remaining_ratio must be in [0, 1), got {}",
                self.memory.min_remaining_ratio
            )));
        }
        if self.conversation.max_chunk_len == 0 {
            return Err(RelayError::Config(
                "conversation.max_chunk_len must be positive".into(),
            ));
        }
        if self.completion.timeout_secs == 0 {
            return Err(RelayError::Config(
                "completion.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn budget_policy(&self) -> BudgetPolicy {
        BudgetPolicy::new(self.memory.budget).with_min_remaining_ratio(self.memory.min_remaining_ratio)
    }

    /// Counter for the configured counting model.
    pub fn token_counter(&self) -> Result<TokenCounter> {
        TokenCounter::for_model(&self.memory.counting_model)
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.completion.temperature,
            top_p: self.completion.top_p,
            frequency_penalty: self.completion.frequency_penalty,
            presence_penalty: self.completion.presence_penalty,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            max_chunk_len: self.conversation.max_chunk_len,
            mention_idle_window: Duration::from_secs(self.conversation.mention_idle_secs),
            completion_timeout: Duration::from_secs(self.completion.timeout_secs),
            default_template: self.conversation.default_template.clone(),
        }
    }
}
