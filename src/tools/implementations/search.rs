//! `search` tool: one document search request

use crate::errors::Result;
use crate::providers::{DocumentSearchProvider, SearchRequest};
use crate::tools::retry::{AttemptLog, RetryableClient};
use crate::tools::types::{SearchInput, Tool, ToolName, ToolSchema};
use crate::types::{sort_results, SearchResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct SearchTool {
    provider: Arc<dyn DocumentSearchProvider>,
    client: RetryableClient,
}

impl SearchTool {
    pub fn new(provider: Arc<dyn DocumentSearchProvider>, client: RetryableClient) -> Self {
        Self { provider, client }
    }
}

#[async_trait]
impl Tool for SearchTool {
    type Input = SearchInput;
    type Output = Vec<SearchResult>;

    fn name(&self) -> ToolName {
        ToolName::Search
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            ToolName::Search,
            "Query the document index by text (semantic ranking) or by vector",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "oneOf": [
                            { "type": "object", "properties": { "type": { "const": "text" }, "value": { "type": "string" } } },
                            { "type": "object", "properties": { "type": { "const": "vector" }, "value": { "type": "array", "items": { "type": "number" } } } }
                        ]
                    },
                    "top_k": { "type": "integer", "minimum": 1 }
                },
                "required": ["query", "top_k"]
            }),
            json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "doc_id": { "type": "string" },
                        "content": { "type": "string" },
                        "score": { "type": "number" },
                        "source": { "type": "string" }
                    }
                }
            }),
            true,
        )
    }

    async fn run(&self, input: SearchInput, log: &AttemptLog) -> Result<Vec<SearchResult>> {
        let request = SearchRequest {
            query: input.query,
            top_k: input.top_k,
        };
        let provider = &self.provider;
        let request = &request;

        let mut results = self
            .client
            .call(provider.name(), log, move || provider.search(request))
            .await?;
        sort_results(&mut results);
        results.truncate(request.top_k);
        Ok(results)
    }
}
