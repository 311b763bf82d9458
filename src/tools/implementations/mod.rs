//! Tool implementations module

pub mod embed;
pub mod generate;
pub mod rank;
pub mod search;

// Re-export for convenience
pub use embed::EmbedTool;
pub use generate::GenerateTool;
pub use rank::RankTool;
pub use search::SearchTool;
