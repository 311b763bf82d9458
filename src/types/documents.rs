//! Search result records

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A candidate document produced by a search strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub content: String,
    pub score: f64,
    /// Which retrieval path produced the score ("vector", "semantic", "hybrid")
    pub source: String,
}

impl SearchResult {
    pub fn new(
        doc_id: impl Into<String>,
        content: impl Into<String>,
        score: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            content: content.into(),
            score,
            source: source.into(),
        }
    }

    /// Canonical ordering: score descending, then doc_id ascending
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.doc_id.cmp(&other.doc_id))
    }
}

/// Sort results into canonical order in place
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(SearchResult::canonical_cmp);
}
