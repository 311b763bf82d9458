//! Agent orchestration module
//! 
//! Stage state machine, cooperative cancellation, and the orchestrator that
//! composes retrieval, ranking, and generation under a workflow trace.

pub mod state;
pub mod cancel;
pub mod orchestrator;

// Re-export commonly used types
pub use state::{Stage, StageEvent};
pub use cancel::CancelToken;
pub use orchestrator::{Answer, Orchestrator};
