// Semantic retrieval: the provider's own relevance ranking, no embedding
use crate::errors::Result;
use crate::providers::SearchQuery;
use crate::rag::retrieval::{tag_source, unavailable, SearchStrategy, StrategyKind};
use crate::tools::types::SearchInput;
use crate::tools::{AttemptLog, Tool, ToolRegistry};
use crate::types::SearchResult;
use async_trait::async_trait;

pub struct SemanticStrategy {
    tools: ToolRegistry,
}

impl SemanticStrategy {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl SearchStrategy for SemanticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        log: &AttemptLog,
    ) -> Result<Vec<SearchResult>> {
        let results = self
            .tools
            .search()
            .execute(
                SearchInput {
                    query: SearchQuery::Text(query.to_string()),
                    top_k,
                },
                log,
            )
            .await
            .map_err(|e| unavailable(self.kind(), e))?;

        Ok(tag_source(results, self.kind()))
    }
}
