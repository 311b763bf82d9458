// Vector retrieval: embed the query, then search by similarity
use crate::errors::Result;
use crate::providers::SearchQuery;
use crate::rag::retrieval::{tag_source, unavailable, SearchStrategy, StrategyKind};
use crate::tools::types::{EmbedInput, SearchInput};
use crate::tools::{AttemptLog, Tool, ToolRegistry};
use crate::types::SearchResult;
use async_trait::async_trait;

pub struct VectorStrategy {
    tools: ToolRegistry,
}

impl VectorStrategy {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl SearchStrategy for VectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vector
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        log: &AttemptLog,
    ) -> Result<Vec<SearchResult>> {
        let vector = self
            .tools
            .embed()
            .execute(
                EmbedInput {
                    text: query.to_string(),
                },
                log,
            )
            .await
            .map_err(|e| unavailable(self.kind(), e))?;

        let results = self
            .tools
            .search()
            .execute(
                SearchInput {
                    query: SearchQuery::Vector(vector),
                    top_k,
                },
                log,
            )
            .await
            .map_err(|e| unavailable(self.kind(), e))?;

        Ok(tag_source(results, self.kind()))
    }
}
