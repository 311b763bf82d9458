//! `generate` tool: chat completion through the generation provider

use crate::errors::Result;
use crate::providers::{ChatRequest, GenerationProvider};
use crate::tools::retry::{AttemptLog, RetryableClient};
use crate::tools::types::{GenerateInput, GenerateOutput, Tool, ToolName, ToolSchema};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct GenerateTool {
    provider: Arc<dyn GenerationProvider>,
    client: RetryableClient,
}

impl GenerateTool {
    pub fn new(provider: Arc<dyn GenerationProvider>, client: RetryableClient) -> Self {
        Self { provider, client }
    }
}

#[async_trait]
impl Tool for GenerateTool {
    type Input = GenerateInput;
    type Output = GenerateOutput;

    fn name(&self) -> ToolName {
        ToolName::Generate
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            ToolName::Generate,
            "Generate an answer from chat messages",
            json!({
                "type": "object",
                "properties": {
                    "messages": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "role": { "enum": ["system", "user", "assistant"] },
                                "content": { "type": "string" }
                            }
                        }
                    },
                    "temperature": { "type": "number", "minimum": 0.0, "maximum": 2.0 },
                    "max_tokens": { "type": "integer", "minimum": 1 }
                },
                "required": ["messages", "temperature", "max_tokens"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "usage": { "type": "object" }
                }
            }),
            true,
        )
    }

    async fn run(&self, input: GenerateInput, log: &AttemptLog) -> Result<GenerateOutput> {
        let request = ChatRequest {
            messages: input.messages,
            temperature: input.temperature,
            max_tokens: input.max_tokens,
        };
        let provider = &self.provider;
        let request = &request;

        let generation = self
            .client
            .call(provider.name(), log, move || provider.generate(request))
            .await?;

        Ok(GenerateOutput {
            text: generation.text,
            usage: generation.usage,
        })
    }
}
