//! Workflow tracking
//!
//! Step-by-step record of how each answer was produced:
//! - `workflow`: steps, traces, summaries, export shape
//! - `store`: bounded concurrent store with sealed-only eviction
//! - `tracer`: opening, appending, sealing, reading
//! - `storage`: persistence sinks for sealed traces

pub mod workflow;
pub mod store;
pub mod tracer;
pub mod storage;

pub use workflow::{
    ExportedStep, ExportedTrace, PendingStep, TraceStatus, TraceSummary, WorkflowStep,
    WorkflowTrace,
};
pub use store::TraceStore;
pub use tracer::{TraceHandle, WorkflowTracer};
pub use storage::{JsonFileSink, TraceSink};
