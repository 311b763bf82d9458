//! Tool registry
//!
//! Resolves every tool once at startup from the configured providers.
//! Tools are typed fields, not string-keyed entries, so the pipeline cannot
//! ask for a tool that does not exist.
//!
//! Tools:
//! - embed: Text to vector
//! - search: Document search by text or vector
//! - rank: Score ordering and budget trimming
//! - generate: Chat completion

use crate::providers::ProviderSet;
use crate::tools::implementations::{EmbedTool, GenerateTool, RankTool, SearchTool};
use crate::tools::retry::{RetryPolicy, RetryableClient};
use crate::tools::types::{Tool, ToolName, ToolSchema};
use std::sync::Arc;

/// Tool registry, read-only after construction
#[derive(Clone)]
pub struct ToolRegistry {
    embed: Arc<EmbedTool>,
    search: Arc<SearchTool>,
    rank: Arc<RankTool>,
    generate: Arc<GenerateTool>,
}

impl ToolRegistry {
    /// Build all tools; remote tools share one retry policy
    pub fn new(providers: ProviderSet, policy: RetryPolicy) -> Self {
        let client = RetryableClient::new(policy);

        Self {
            embed: Arc::new(EmbedTool::new(providers.embedding, client.clone())),
            search: Arc::new(SearchTool::new(providers.search, client.clone())),
            rank: Arc::new(RankTool::new()),
            generate: Arc::new(GenerateTool::new(providers.generation, client)),
        }
    }

    pub fn embed(&self) -> &EmbedTool {
        &self.embed
    }

    pub fn search(&self) -> &SearchTool {
        &self.search
    }

    pub fn rank(&self) -> &RankTool {
        &self.rank
    }

    pub fn generate(&self) -> &GenerateTool {
        &self.generate
    }

    /// Schema for a tool
    pub fn schema(&self, name: ToolName) -> ToolSchema {
        match name {
            ToolName::Embed => self.embed.schema(),
            ToolName::Search => self.search.schema(),
            ToolName::Rank => self.rank.schema(),
            ToolName::Generate => self.generate.schema(),
        }
    }

    /// All schemas, in `ToolName::ALL` order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        ToolName::ALL.iter().map(|name| self.schema(*name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = ToolRegistry::new(ProviderSet::offline(), RetryPolicy::default());
        let schemas = registry.schemas();

        assert_eq!(schemas.len(), 4);
        for (schema, name) in schemas.iter().zip(ToolName::ALL) {
            assert_eq!(schema.name, name);
        }
    }

    #[test]
    fn test_rank_is_local() {
        let registry = ToolRegistry::new(ProviderSet::offline(), RetryPolicy::default());
        assert!(!registry.schema(ToolName::Rank).remote);
        assert!(registry.schema(ToolName::Search).remote);
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        let registry = ToolRegistry::new(ProviderSet::offline(), RetryPolicy::default());
        let schema = registry.schema(ToolName::Search);
        let required = schema.input["required"].as_array().unwrap();
        assert!(required.iter().any(|f| f == "top_k"));
    }
}
