// Ranking and context-budget trimming
pub mod ranker;

pub use ranker::BudgetRanker;
