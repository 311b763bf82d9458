//! Context management module
//! 
//! Token estimation and the per-session conversation history that feeds
//! prompt assembly.

pub mod counter;
pub mod conversation;

// Re-export commonly used types
pub use counter::TokenCounter;
pub use conversation::{ConversationContext, HistoryBudget, DEFAULT_TOKEN_BUDGET};
