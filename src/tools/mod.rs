//! Tool layer
//!
//! Typed capabilities behind a single contract:
//! - 4 tools (embed, search, rank, generate)
//! - Input validation before any provider call
//! - Retryable client (exponential backoff, attempt metadata)
//! - Startup-time registry

pub mod types;
pub mod registry;
pub mod retry;
pub mod implementations;

// Re-export commonly used types
pub use types::{Tool, ToolName, ToolSchema, Validate};
pub use registry::ToolRegistry;
pub use retry::{AttemptLog, AttemptRecord, RetryPolicy, RetryableClient};
