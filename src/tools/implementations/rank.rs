//! `rank` tool: local ordering and budget trimming, no provider call

use crate::errors::Result;
use crate::rag::reranking::BudgetRanker;
use crate::tools::retry::AttemptLog;
use crate::tools::types::{RankInput, RankOutput, Tool, ToolName, ToolSchema};
use async_trait::async_trait;
use serde_json::json;

#[derive(Debug, Default)]
pub struct RankTool {
    ranker: BudgetRanker,
}

impl RankTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for RankTool {
    type Input = RankInput;
    type Output = RankOutput;

    fn name(&self) -> ToolName {
        ToolName::Rank
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            ToolName::Rank,
            "Order candidates by score and trim them to a token budget",
            json!({
                "type": "object",
                "properties": {
                    "candidates": { "type": "array" },
                    "budget_tokens": { "type": "integer", "minimum": 1 }
                },
                "required": ["candidates", "budget_tokens"]
            }),
            json!({
                "type": "object",
                "properties": {
                    "kept": { "type": "array" },
                    "dropped": { "type": "array", "items": { "type": "string" } },
                    "used_tokens": { "type": "integer" }
                }
            }),
            false,
        )
    }

    async fn run(&self, input: RankInput, _log: &AttemptLog) -> Result<RankOutput> {
        Ok(self.ranker.rank(input.candidates, input.budget_tokens))
    }
}
