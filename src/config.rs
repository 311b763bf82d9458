//! Configuration management for ragscope
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.ragscope/config.toml
//!
//! The value is built once at startup, wrapped in an `Arc`, and handed to the
//! orchestrator and every tool. Nothing mutates it afterwards.

use crate::context::HistoryBudget;
use crate::errors::{RagError, Result};
use crate::rag::retrieval::StrategyKind;
use crate::tools::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder shown instead of secret values
const MASK: &str = "********";

/// Complete configuration for ragscope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub providers: ProvidersConfig,
    pub retry: RetryConfig,
    pub search: SearchConfig,
    pub ranking: RankingConfig,
    pub generation: GenerationConfig,
    pub conversation: ConversationConfig,
    pub pipeline: PipelineConfig,
    pub traces: TraceConfig,
    pub logging: LoggingConfig,
}

/// Remote provider endpoints and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai_endpoint: String,
    pub openai_api_key: String,
    pub openai_api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub search_endpoint: String,
    pub search_api_key: String,
    pub search_api_version: String,
    pub search_index: String,
    pub vector_field: String,
    pub semantic_configuration: String,
}

/// Backoff policy for remote calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    /// Upper bound of random jitter as a fraction of the computed delay
    pub jitter_ratio: f64,
    /// Timeout applied to every individual attempt
    pub attempt_timeout_ms: u64,
}

/// Retrieval strategy selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: StrategyKind,
    pub top_k: usize,
    /// Added to the max score of documents found by both hybrid sub-searches
    pub overlap_bonus: f64,
    /// Strategy tried when the primary one is unavailable; never implicit
    pub fallback: Option<StrategyKind>,
}

/// Candidate trimming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Approximate token budget for concatenated document content
    pub context_budget_tokens: usize,
}

/// Answer generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub token_budget: usize,
}

/// Stage-level behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Aggregate budget for each stage, independent of attempt timeouts
    pub stage_timeout_ms: u64,
    pub query_understanding: bool,
    pub max_query_chars: usize,
}

/// Trace retention and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Sealed traces kept in memory before the oldest are evicted
    pub capacity: usize,
    /// Directory receiving one JSON file per sealed trace
    pub export_dir: Option<String>,
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_endpoint: String::new(),
            openai_api_key: String::new(),
            openai_api_version: "2024-02-01".to_string(),
            chat_deployment: "gpt-4o-mini".to_string(),
            embedding_deployment: "text-embedding-ada-002".to_string(),
            search_endpoint: String::new(),
            search_api_key: String::new(),
            search_api_version: "2023-11-01".to_string(),
            search_index: "rca-index".to_string(),
            vector_field: "contentVector".to_string(),
            semantic_configuration: "default".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 8_000,
            jitter_ratio: 0.1,
            attempt_timeout_ms: 15_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Hybrid,
            top_k: 5,
            overlap_bonus: 0.1,
            fallback: None,
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            context_budget_tokens: 3_000,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are an assistant for Azure DevOps questions. \
                Answer using the provided documents. If they do not contain the answer, say so. \
                Cite documents as [1], [2], ... when you rely on them."
                .to_string(),
            temperature: 0.5,
            max_tokens: 800,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            token_budget: crate::context::DEFAULT_TOKEN_BUDGET,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: 60_000,
            query_understanding: false,
            max_query_chars: 2_000,
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            export_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RagConfig {
    /// Load configuration from file or use defaults, then apply environment
    /// overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(config_path) = path {
            Self::load_from_file(&config_path)?
        } else {
            Self::load_default()?
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| RagError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from the standard location or fall back to built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(RagConfig::default())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ragscope").join("config.toml"))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let providers = &mut self.providers;
        let targets: [(&str, &mut String); 4] = [
            ("RAGSCOPE_OPENAI_ENDPOINT", &mut providers.openai_endpoint),
            ("RAGSCOPE_OPENAI_API_KEY", &mut providers.openai_api_key),
            ("RAGSCOPE_SEARCH_ENDPOINT", &mut providers.search_endpoint),
            ("RAGSCOPE_SEARCH_API_KEY", &mut providers.search_api_key),
        ];

        for (key, slot) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(RagError::ConfigError(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(RagError::ConfigError(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(RagError::ConfigError(
                "retry.jitter_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(RagError::ConfigError(
                "retry.max_delay_ms must be at least retry.base_delay_ms".to_string(),
            ));
        }

        if self.search.top_k == 0 {
            return Err(RagError::ConfigError(
                "search.top_k must be greater than 0".to_string(),
            ));
        }

        if self.search.overlap_bonus < 0.0 {
            return Err(RagError::ConfigError(
                "search.overlap_bonus must not be negative".to_string(),
            ));
        }

        if self.ranking.context_budget_tokens == 0 {
            return Err(RagError::ConfigError(
                "ranking.context_budget_tokens must be greater than 0".to_string(),
            ));
        }

        if self.conversation.token_budget == 0 {
            return Err(RagError::ConfigError(
                "conversation.token_budget must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.stage_timeout_ms == 0 || self.retry.attempt_timeout_ms == 0 {
            return Err(RagError::ConfigError(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if self.traces.capacity == 0 {
            return Err(RagError::ConfigError(
                "traces.capacity must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(RagError::ConfigError(format!(
                    "Invalid log level: {}",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Copy with every secret replaced by a mask, for display
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        for secret in [
            &mut copy.providers.openai_api_key,
            &mut copy.providers.search_api_key,
        ] {
            if !secret.is_empty() {
                *secret = MASK.to_string();
            }
        }
        copy
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RagError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Retry policy derived from the `[retry]` section
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter_ratio: self.retry.jitter_ratio,
            attempt_timeout: Duration::from_millis(self.retry.attempt_timeout_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn history_budget(&self) -> HistoryBudget {
        HistoryBudget::Tokens(self.conversation.token_budget)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline.stage_timeout_ms)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn export_dir(&self) -> Option<PathBuf> {
        self.traces.export_dir.as_deref().map(Self::expand_path)
    }
}
