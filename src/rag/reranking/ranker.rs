// Budget ranking for retrieved candidates
use crate::context::TokenCounter;
use crate::tools::types::RankOutput;
use crate::types::{sort_results, SearchResult};

/// Orders candidates and trims them to a context budget
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetRanker {
    counter: TokenCounter,
}

impl BudgetRanker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort by score descending (doc_id ascending on ties), then drop the
    /// lowest-scored documents until the estimated tokens of the remaining
    /// content fit `budget_tokens`.
    ///
    /// A single document larger than the budget is dropped like any other;
    /// the result may be empty.
    pub fn rank(&self, mut candidates: Vec<SearchResult>, budget_tokens: usize) -> RankOutput {
        sort_results(&mut candidates);

        let mut used_tokens = self.counter.estimate_documents(&candidates);
        let mut dropped = Vec::new();

        while used_tokens > budget_tokens {
            match candidates.pop() {
                Some(lowest) => {
                    used_tokens -= self.counter.estimate(&lowest.content);
                    dropped.push(lowest.doc_id);
                }
                None => break,
            }
        }

        RankOutput {
            kept: candidates,
            dropped,
            used_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, score: f64, tokens: usize) -> SearchResult {
        SearchResult::new(id, "x".repeat(tokens * 4), score, "vector")
    }

    #[test]
    fn test_within_budget_keeps_everything_in_order() {
        let output = BudgetRanker::new().rank(
            vec![doc("c", 0.5, 10), doc("a", 0.9, 10), doc("b", 0.7, 10)],
            100,
        );

        let ids: Vec<&str> = output.kept.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(output.dropped.is_empty());
        assert_eq!(output.used_tokens, 30);
    }

    #[test]
    fn test_drops_lowest_scored_first() {
        let output = BudgetRanker::new().rank(
            vec![doc("a", 0.9, 10), doc("b", 0.7, 10), doc("c", 0.5, 10)],
            20,
        );

        assert_eq!(output.kept.len(), 2);
        assert_eq!(output.dropped, vec!["c".to_string()]);
        assert_eq!(output.used_tokens, 20);
    }

    #[test]
    fn test_tie_broken_by_doc_id() {
        let output = BudgetRanker::new().rank(
            vec![doc("b", 0.5, 10), doc("a", 0.5, 10)],
            10,
        );

        assert_eq!(output.kept[0].doc_id, "a");
        assert_eq!(output.dropped, vec!["b".to_string()]);
    }

    #[test]
    fn test_oversized_document_is_dropped() {
        let output = BudgetRanker::new().rank(vec![doc("a", 0.9, 50)], 10);
        assert!(output.kept.is_empty());
        assert_eq!(output.used_tokens, 0);
    }
}
