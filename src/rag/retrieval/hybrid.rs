// Hybrid retrieval: vector and semantic concurrently, then a pure merge
//
// Merge rule:
//   in both lists  -> max(vector, semantic) + overlap_bonus
//   in one list    -> original score
//   order          -> combined score desc, then first appearance
//                     (vector positions first, semantic offset by vector.len())
//   truncate       -> top_k
use crate::errors::Result;
use crate::rag::retrieval::{
    unavailable, SearchStrategy, SemanticStrategy, StrategyKind, VectorStrategy,
};
use crate::tools::{AttemptLog, ToolRegistry};
use crate::types::SearchResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

pub struct HybridStrategy {
    vector: VectorStrategy,
    semantic: SemanticStrategy,
    overlap_bonus: f64,
}

impl HybridStrategy {
    pub fn new(tools: ToolRegistry, overlap_bonus: f64) -> Self {
        Self {
            vector: VectorStrategy::new(tools.clone()),
            semantic: SemanticStrategy::new(tools),
            overlap_bonus,
        }
    }
}

#[async_trait]
impl SearchStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        log: &AttemptLog,
    ) -> Result<Vec<SearchResult>> {
        // Both futures are polled to completion before merging; neither
        // outlives this call.
        let (vector, semantic) = tokio::join!(
            self.vector.search(query, top_k, log),
            self.semantic.search(query, top_k, log)
        );

        let vector = vector.map_err(|e| unavailable(self.kind(), e))?;
        let semantic = semantic.map_err(|e| unavailable(self.kind(), e))?;

        debug!(
            vector = vector.len(),
            semantic = semantic.len(),
            "Merging hybrid candidates"
        );
        Ok(merge(&vector, &semantic, self.overlap_bonus, top_k))
    }
}

struct Candidate {
    first_seen: usize,
    vector_score: Option<f64>,
    semantic_score: Option<f64>,
    result: SearchResult,
}

impl Candidate {
    fn combined(&self, overlap_bonus: f64) -> f64 {
        match (self.vector_score, self.semantic_score) {
            (Some(v), Some(s)) => v.max(s) + overlap_bonus,
            (Some(v), None) => v,
            (None, Some(s)) => s,
            (None, None) => 0.0,
        }
    }
}

/// Merge vector and semantic candidate lists
///
/// A pure function of its inputs, so the result cannot depend on which
/// sub-search finished first. A doc_id repeated within one list keeps its
/// best score from that list.
pub fn merge(
    vector: &[SearchResult],
    semantic: &[SearchResult],
    overlap_bonus: f64,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut candidates: Vec<Candidate> = Vec::with_capacity(vector.len() + semantic.len());

    let positioned = vector
        .iter()
        .enumerate()
        .map(|(i, r)| (i, r, true))
        .chain(
            semantic
                .iter()
                .enumerate()
                .map(|(j, r)| (vector.len() + j, r, false)),
        );

    for (position, result, from_vector) in positioned {
        let slot = *index.entry(result.doc_id.as_str()).or_insert_with(|| {
            candidates.push(Candidate {
                first_seen: position,
                vector_score: None,
                semantic_score: None,
                result: result.clone(),
            });
            candidates.len() - 1
        });

        let candidate = &mut candidates[slot];
        let score = if from_vector {
            &mut candidate.vector_score
        } else {
            &mut candidate.semantic_score
        };
        *score = Some(score.map_or(result.score, |s| s.max(result.score)));
    }

    let mut merged: Vec<(usize, SearchResult)> = candidates
        .into_iter()
        .map(|candidate| {
            let combined = candidate.combined(overlap_bonus);
            let overlapped = candidate.vector_score.is_some() && candidate.semantic_score.is_some();
            let mut result = candidate.result;
            result.score = combined;
            if overlapped {
                result.source = StrategyKind::Hybrid.to_string();
            }
            (candidate.first_seen, result)
        })
        .collect();

    merged.sort_by(|(pos_a, a), (pos_b, b)| {
        b.score.total_cmp(&a.score).then_with(|| pos_a.cmp(pos_b))
    });
    merged.truncate(top_k);
    merged.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(id: &str, score: f64, source: &str) -> SearchResult {
        SearchResult::new(id, format!("content of {}", id), score, source)
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.doc_id.as_str()).collect()
    }

    #[test]
    fn test_overlap_gets_bonus() {
        let vector = vec![r("a", 0.8, "vector"), r("b", 0.6, "vector")];
        let semantic = vec![r("b", 0.7, "semantic"), r("c", 0.65, "semantic")];

        let merged = merge(&vector, &semantic, 0.1, 10);

        assert_eq!(ids(&merged), vec!["a", "b", "c"]);
        assert!((merged[1].score - 0.8).abs() < 1e-9);
        assert_eq!(merged[1].source, "hybrid");
        assert_eq!(merged[2].source, "semantic");
    }

    #[test]
    fn test_ties_follow_first_appearance() {
        // "z" appears first in the vector list, "a" only in semantic
        let vector = vec![r("z", 0.5, "vector")];
        let semantic = vec![r("a", 0.5, "semantic")];

        let merged = merge(&vector, &semantic, 0.0, 10);
        assert_eq!(ids(&merged), vec!["z", "a"]);
    }

    #[test]
    fn test_truncates_to_top_k() {
        let vector = vec![r("a", 0.9, "vector"), r("b", 0.8, "vector")];
        let semantic = vec![r("c", 0.7, "semantic"), r("d", 0.6, "semantic")];

        let merged = merge(&vector, &semantic, 0.1, 3);
        assert_eq!(ids(&merged), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_within_list_keeps_best() {
        let vector = vec![r("a", 0.3, "vector"), r("a", 0.6, "vector")];
        let merged = merge(&vector, &[], 0.1, 10);

        assert_eq!(merged.len(), 1);
        assert!((merged[0].score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge(&[], &[], 0.1, 5).is_empty());
    }
}
