//! Type definitions module
//! 
//! Core records exchanged between the conversation, the search strategies,
//! and the generation provider.

pub mod messages;
pub mod documents;

// Re-export commonly used types
pub use messages::{Message, Role};
pub use documents::{sort_results, SearchResult};
