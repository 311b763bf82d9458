//! `embed` tool: text to vector through the embedding provider

use crate::errors::Result;
use crate::providers::EmbeddingProvider;
use crate::tools::retry::{AttemptLog, RetryableClient};
use crate::tools::types::{EmbedInput, Tool, ToolName, ToolSchema};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct EmbedTool {
    provider: Arc<dyn EmbeddingProvider>,
    client: RetryableClient,
}

impl EmbedTool {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, client: RetryableClient) -> Self {
        Self { provider, client }
    }
}

#[async_trait]
impl Tool for EmbedTool {
    type Input = EmbedInput;
    type Output = Vec<f32>;

    fn name(&self) -> ToolName {
        ToolName::Embed
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            ToolName::Embed,
            "Embed text into a dense vector",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "minLength": 1 }
                },
                "required": ["text"]
            }),
            json!({ "type": "array", "items": { "type": "number" } }),
            true,
        )
    }

    async fn run(&self, input: EmbedInput, log: &AttemptLog) -> Result<Vec<f32>> {
        let provider = &self.provider;
        let text = input.text.as_str();
        self.client
            .call(provider.name(), log, move || provider.embed(text))
            .await
    }
}
