// Retrieval-augmented generation building blocks
//
// Components:
// - Retrieval: Vector, semantic and hybrid search strategies
// - Re-ranking: Score ordering and context-budget trimming
// - Context: Prompt assembly from history and documents
// - Evaluation: Latency and relevance comparison of the strategies

pub mod retrieval;
pub mod reranking;
pub mod context;
pub mod evaluation;

// Re-export key types
pub use retrieval::{build_strategy, SearchStrategy, StrategyKind};
pub use reranking::BudgetRanker;
pub use context::{Prompt, PromptBuilder};
pub use evaluation::{EvalCase, SearchEvaluator};
