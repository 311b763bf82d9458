//! Tool contract and typed inputs/outputs
//!
//! Every capability the pipeline uses (embed, search, rank, generate) is a
//! `Tool` with a declared schema and typed input/output. `execute` validates
//! the input before running, so a malformed input never reaches a provider.

use crate::errors::{RagError, Result};
use crate::providers::{SearchQuery, Usage};
use crate::tools::retry::AttemptLog;
use crate::types::{Message, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable tool identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Embed,
    Search,
    Rank,
    Generate,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::Embed,
        ToolName::Search,
        ToolName::Rank,
        ToolName::Generate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Embed => "embed",
            ToolName::Search => "search",
            ToolName::Rank => "rank",
            ToolName::Generate => "generate",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: ToolName,

    /// Tool description
    pub description: String,

    /// Input schema (JSON Schema)
    pub input: serde_json::Value,

    /// Output schema (JSON Schema)
    pub output: serde_json::Value,

    /// Whether the tool calls an external provider
    pub remote: bool,
}

impl ToolSchema {
    pub fn new(
        name: ToolName,
        description: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
        remote: bool,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            input,
            output,
            remote,
        }
    }
}

/// The first field of an input that violates its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub field: String,
    pub reason: String,
}

impl InvalidField {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Input validation against a tool's declared schema
pub trait Validate {
    fn validate(&self) -> std::result::Result<(), InvalidField>;
}

/// A typed capability
#[async_trait]
pub trait Tool: Send + Sync {
    type Input: Validate + Send + Sync;
    type Output: Send;

    fn name(&self) -> ToolName;

    fn schema(&self) -> ToolSchema;

    /// Run with an already validated input
    async fn run(&self, input: Self::Input, log: &AttemptLog) -> Result<Self::Output>;

    /// Validate the input, then run
    async fn execute(&self, input: Self::Input, log: &AttemptLog) -> Result<Self::Output> {
        if let Err(invalid) = input.validate() {
            return Err(RagError::Validation {
                tool: self.name().to_string(),
                field: invalid.field,
                reason: invalid.reason,
            });
        }
        self.run(input, log).await
    }
}

/// Input for `embed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedInput {
    pub text: String,
}

/// Input for `search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchInput {
    pub query: SearchQuery,
    pub top_k: usize,
}

/// Input for `rank`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankInput {
    pub candidates: Vec<SearchResult>,

    /// Approximate token budget for the concatenated content
    pub budget_tokens: usize,
}

/// Output of `rank`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankOutput {
    /// Retained documents in rank order
    pub kept: Vec<SearchResult>,

    /// Doc ids removed to satisfy the budget, lowest score first
    pub dropped: Vec<String>,

    /// Estimated tokens of the retained content
    pub used_tokens: usize,
}

/// Input for `generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateInput {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Output of `generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOutput {
    pub text: String,
    pub usage: Usage,
}

impl Validate for EmbedInput {
    fn validate(&self) -> std::result::Result<(), InvalidField> {
        if self.text.trim().is_empty() {
            return Err(InvalidField::new("text", "must not be empty"));
        }
        Ok(())
    }
}

impl Validate for SearchInput {
    fn validate(&self) -> std::result::Result<(), InvalidField> {
        if self.top_k == 0 {
            return Err(InvalidField::new("top_k", "must be greater than 0"));
        }
        match &self.query {
            SearchQuery::Text(text) if text.trim().is_empty() => {
                Err(InvalidField::new("query", "text must not be empty"))
            }
            SearchQuery::Vector(vector) if vector.is_empty() => {
                Err(InvalidField::new("query", "vector must not be empty"))
            }
            SearchQuery::Vector(vector) if vector.iter().any(|v| !v.is_finite()) => {
                Err(InvalidField::new("query", "vector must contain finite values"))
            }
            _ => Ok(()),
        }
    }
}

impl Validate for RankInput {
    fn validate(&self) -> std::result::Result<(), InvalidField> {
        if self.budget_tokens == 0 {
            return Err(InvalidField::new("budget_tokens", "must be greater than 0"));
        }
        if let Some(i) = self.candidates.iter().position(|c| !c.score.is_finite()) {
            return Err(InvalidField::new(
                format!("candidates[{}].score", i),
                "must be finite",
            ));
        }
        Ok(())
    }
}

impl Validate for GenerateInput {
    fn validate(&self) -> std::result::Result<(), InvalidField> {
        if self.messages.is_empty() {
            return Err(InvalidField::new("messages", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(InvalidField::new("temperature", "must be between 0.0 and 2.0"));
        }
        if self.max_tokens == 0 {
            return Err(InvalidField::new("max_tokens", "must be greater than 0"));
        }
        Ok(())
    }
}
