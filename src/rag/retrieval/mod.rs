// Search strategies: vector, semantic and hybrid retrieval
pub mod hybrid;
pub mod semantic;
pub mod vector;

pub use hybrid::{merge, HybridStrategy};
pub use semantic::SemanticStrategy;
pub use vector::VectorStrategy;

use crate::errors::{RagError, Result};
use crate::tools::{AttemptLog, ToolRegistry};
use crate::types::SearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Retrieval algorithm selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Vector,
    Semantic,
    Hybrid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Vector => "vector",
            StrategyKind::Semantic => "semantic",
            StrategyKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common contract: at most `top_k` results, best first
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Attempts of every provider call land in `log`
    async fn search(&self, query: &str, top_k: usize, log: &AttemptLog)
        -> Result<Vec<SearchResult>>;
}

/// Build the strategy for `kind`; the mapping is fixed, never per-query
pub fn build_strategy(
    kind: StrategyKind,
    tools: ToolRegistry,
    overlap_bonus: f64,
) -> Arc<dyn SearchStrategy> {
    match kind {
        StrategyKind::Vector => Arc::new(VectorStrategy::new(tools)),
        StrategyKind::Semantic => Arc::new(SemanticStrategy::new(tools)),
        StrategyKind::Hybrid => Arc::new(HybridStrategy::new(tools, overlap_bonus)),
    }
}

/// Wrap a failure of `kind` as `SearchUnavailable`
pub(crate) fn unavailable(kind: StrategyKind, source: RagError) -> RagError {
    RagError::SearchUnavailable {
        strategy: kind.to_string(),
        source: Box::new(source),
    }
}

/// Relabel provider results with the retrieval path that produced them
pub(crate) fn tag_source(results: Vec<SearchResult>, kind: StrategyKind) -> Vec<SearchResult> {
    results
        .into_iter()
        .map(|mut r| {
            r.source = kind.to_string();
            r
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::providers::offline::{EchoGenerator, HashEmbedder};
    use crate::providers::{DocumentSearchProvider, ProviderSet, SearchRequest};
    use crate::tools::RetryPolicy;

    /// Returns its results worst first and ignores `top_k`
    struct UnorderedSearch;

    #[async_trait]
    impl DocumentSearchProvider for UnorderedSearch {
        fn name(&self) -> &str {
            "unordered_search"
        }

        async fn search(
            &self,
            _request: &SearchRequest,
        ) -> std::result::Result<Vec<SearchResult>, ProviderError> {
            Ok(vec![
                SearchResult::new("low", "low", 0.2, "index"),
                SearchResult::new("mid", "mid", 0.5, "index"),
                SearchResult::new("best", "best", 0.9, "index"),
            ])
        }
    }

    fn tools() -> ToolRegistry {
        let providers = ProviderSet::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(UnorderedSearch),
            Arc::new(EchoGenerator::default()),
        );
        ToolRegistry::new(providers, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_single_path_strategies_rank_before_truncating() {
        for kind in [StrategyKind::Semantic, StrategyKind::Vector] {
            let strategy = build_strategy(kind, tools(), 0.1);
            let results = strategy.search("pipelines", 2, &AttemptLog::new()).await.unwrap();

            let ids: Vec<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
            assert_eq!(ids, vec!["best", "mid"], "{} strategy", kind);
            assert!(results.iter().all(|r| r.source == kind.as_str()));
        }
    }

    #[tokio::test]
    async fn test_hybrid_ranks_unordered_provider_lists() {
        let strategy = build_strategy(StrategyKind::Hybrid, tools(), 0.1);
        let results = strategy.search("pipelines", 2, &AttemptLog::new()).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["best", "mid"]);
        assert!(results[0].score >= results[1].score);
    }
}
