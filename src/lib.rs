//! ragscope - Traceable retrieval-augmented answering
//!
//! Answers questions from a document index and records, for every query, a
//! step-by-step trace of how the answer was produced.
//!
//! # Architecture
//!
//! - **Providers**: embedding, document search and generation behind traits
//! - **Tools**: validated, retried calls into the providers
//! - **RAG**: search strategies, budget ranking, prompt assembly
//! - **Agent**: stage machine and orchestrator
//! - **Tracking**: workflow traces, bounded store, persistence

pub mod errors;
pub mod config;
pub mod telemetry;
pub mod types;
pub mod context;
pub mod providers;
pub mod tools;
pub mod rag;
pub mod tracking;
pub mod agent;
pub mod cli;

// Re-export commonly used types
pub use errors::{ErrorKind, ProcessError, RagError, Result};
pub use config::RagConfig;
pub use agent::{Answer, CancelToken, Orchestrator};
pub use context::ConversationContext;
pub use providers::ProviderSet;
pub use tracking::{TraceStatus, WorkflowTrace, WorkflowTracer};
