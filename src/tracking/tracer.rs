//! Workflow tracer
//!
//! Opens traces, hands the owning query a `TraceHandle` for appending steps
//! and sealing, and serves reads to everyone else.

use crate::errors::{RagError, Result};
use crate::tracking::storage::TraceSink;
use crate::tracking::store::{read_trace, write_trace, SharedTrace, TraceStore};
use crate::tracking::workflow::{ExportedTrace, TraceStatus, TraceSummary, WorkflowStep, WorkflowTrace};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Entry point for recording and reading traces
#[derive(Clone)]
pub struct WorkflowTracer {
    store: Arc<TraceStore>,
    sink: Option<Arc<dyn TraceSink>>,
}

impl Default for WorkflowTracer {
    fn default() -> Self {
        Self::new(Arc::new(TraceStore::default()))
    }
}

impl WorkflowTracer {
    pub fn new(store: Arc<TraceStore>) -> Self {
        Self { store, sink: None }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Arc::new(TraceStore::new(capacity)))
    }

    /// Persist every sealed trace through `sink`
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Open a RUNNING trace for `query`
    pub fn begin(&self, query: &str) -> TraceHandle {
        let trace_id = Uuid::new_v4().to_string();
        let trace = self.store.insert(WorkflowTrace::new(trace_id.clone(), query));
        debug!(trace_id = %trace_id, "Trace opened");

        TraceHandle {
            trace_id,
            trace,
            store: self.store.clone(),
            sink: self.sink.clone(),
            started: Instant::now(),
        }
    }

    /// Summaries, most recent first
    pub fn list_traces(&self, limit: usize) -> Vec<TraceSummary> {
        self.store.recent(limit)
    }

    /// Full trace; RUNNING traces return the steps recorded so far
    pub fn get_trace(&self, trace_id: &str) -> Result<WorkflowTrace> {
        self.store
            .snapshot(trace_id)
            .ok_or_else(|| RagError::TraceNotFound(trace_id.to_string()))
    }

    pub fn export(&self, trace_id: &str) -> Result<ExportedTrace> {
        self.get_trace(trace_id).map(|trace| trace.export())
    }

    pub fn store(&self) -> &TraceStore {
        &self.store
    }
}

/// Write access to one trace, held by the query that owns it
pub struct TraceHandle {
    trace_id: String,
    trace: SharedTrace,
    store: Arc<TraceStore>,
    sink: Option<Arc<dyn TraceSink>>,
    started: Instant,
}

impl TraceHandle {
    pub fn id(&self) -> &str {
        &self.trace_id
    }

    /// Append a completed step
    pub fn append_step(&self, step: WorkflowStep) -> Result<()> {
        let mut trace = write_trace(&self.trace);
        if trace.is_sealed() {
            return Err(RagError::TraceSealed(self.trace_id.clone()));
        }
        debug!(
            trace_id = %self.trace_id,
            step = %step.step_name,
            success = step.success,
            duration_ms = step.duration_ms,
            "Step recorded"
        );
        let recorded = self.sink.as_ref().map(|_| step.clone());
        trace.steps.push(step);
        drop(trace);

        if let (Some(sink), Some(step)) = (&self.sink, recorded) {
            sink.on_step(&self.trace_id, &step);
        }
        Ok(())
    }

    pub fn status(&self) -> TraceStatus {
        read_trace(&self.trace).status
    }

    /// Seal with a terminal status; the trace is immutable afterwards
    ///
    /// The sink writes on the blocking pool and has finished when this
    /// returns.
    pub async fn seal(
        &self,
        status: TraceStatus,
        final_response: Option<String>,
    ) -> Result<WorkflowTrace> {
        if !status.is_sealed() {
            return Err(RagError::InvalidTransition {
                from: format!("{:?}", TraceStatus::Running),
                to: format!("{:?}", status),
            });
        }

        let snapshot = {
            let mut trace = write_trace(&self.trace);
            if trace.is_sealed() {
                return Err(RagError::TraceSealed(self.trace_id.clone()));
            }
            trace.status = status;
            trace.final_response = final_response;
            trace.total_duration_ms = Some(self.started.elapsed().as_secs_f64() * 1000.0);
            trace.clone()
        };

        self.store.evict_overflow();

        if let Some(sink) = self.sink.clone() {
            let exported = snapshot.export();
            match tokio::task::spawn_blocking(move || sink.persist(&exported)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(trace_id = %self.trace_id, error = %e, "Failed to persist trace");
                }
                Err(e) => {
                    warn!(trace_id = %self.trace_id, error = %e, "Trace persistence task failed");
                }
            }
        }

        debug!(trace_id = %self.trace_id, status = ?status, steps = snapshot.steps.len(), "Trace sealed");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::workflow::PendingStep;
    use serde_json::json;
    use std::sync::Mutex;

    fn step(name: &str) -> WorkflowStep {
        PendingStep::start(name, json!({})).succeed(json!({}), json!({}))
    }

    #[test]
    fn test_running_trace_is_readable() {
        let tracer = WorkflowTracer::default();
        let handle = tracer.begin("q");
        handle.append_step(step("RETRIEVAL")).unwrap();

        let partial = tracer.get_trace(handle.id()).unwrap();
        assert_eq!(partial.status, TraceStatus::Running);
        assert_eq!(partial.step_names(), vec!["RETRIEVAL"]);
    }

    #[tokio::test]
    async fn test_sealed_trace_rejects_changes() {
        let tracer = WorkflowTracer::default();
        let handle = tracer.begin("q");
        handle.append_step(step("RETRIEVAL")).unwrap();
        handle
            .seal(TraceStatus::Completed, Some("answer".to_string()))
            .await
            .unwrap();

        assert!(matches!(
            handle.append_step(step("RANKING")),
            Err(RagError::TraceSealed(_))
        ));
        assert!(matches!(
            handle.seal(TraceStatus::Failed, None).await,
            Err(RagError::TraceSealed(_))
        ));

        let first = tracer.get_trace(handle.id()).unwrap();
        let second = tracer.get_trace(handle.id()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.steps.len(), 1);
        assert!(first.total_duration_ms.is_some());
    }

    #[test]
    fn test_unknown_trace() {
        let tracer = WorkflowTracer::default();
        assert!(matches!(
            tracer.get_trace("missing"),
            Err(RagError::TraceNotFound(_))
        ));
    }

    #[test]
    fn test_list_traces_most_recent_first() {
        let tracer = WorkflowTracer::default();
        let first = tracer.begin("one");
        let second = tracer.begin("two");

        let ids: Vec<String> = tracer.list_traces(10).into_iter().map(|s| s.trace_id).collect();
        assert_eq!(ids, vec![second.id().to_string(), first.id().to_string()]);
    }

    #[tokio::test]
    async fn test_cannot_seal_as_running() {
        let tracer = WorkflowTracer::default();
        let handle = tracer.begin("q");
        assert!(handle.seal(TraceStatus::Running, None).await.is_err());
        assert_eq!(handle.status(), TraceStatus::Running);
    }

    #[derive(Default)]
    struct RecordingSink {
        steps: Mutex<Vec<String>>,
        persisted: Mutex<Vec<String>>,
    }

    impl TraceSink for RecordingSink {
        fn persist(&self, trace: &ExportedTrace) -> Result<()> {
            self.persisted.lock().unwrap().push(trace.trace_id.clone());
            Ok(())
        }

        fn on_step(&self, _trace_id: &str, step: &WorkflowStep) {
            self.steps.lock().unwrap().push(step.step_name.clone());
        }
    }

    #[tokio::test]
    async fn test_sink_sees_steps_and_sealed_trace() {
        let sink = Arc::new(RecordingSink::default());
        let tracer = WorkflowTracer::default().with_sink(sink.clone());
        let handle = tracer.begin("q");
        handle.append_step(step("RETRIEVAL")).unwrap();
        handle.append_step(step("RANKING")).unwrap();
        assert!(sink.persisted.lock().unwrap().is_empty());

        handle.seal(TraceStatus::Cancelled, None).await.unwrap();

        assert_eq!(*sink.steps.lock().unwrap(), vec!["RETRIEVAL", "RANKING"]);
        assert_eq!(*sink.persisted.lock().unwrap(), vec![handle.id().to_string()]);
    }
}
