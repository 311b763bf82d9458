//! Workflow steps and traces
//!
//! A trace records one query from RECEIVED to its terminal stage. Steps are
//! built off to the side by a `PendingStep` and appended only once complete,
//! so a reader never observes a half-written step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Lifecycle of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TraceStatus {
    /// Any status other than RUNNING seals the trace
    pub fn is_sealed(&self) -> bool {
        !matches!(self, TraceStatus::Running)
    }
}

/// One completed pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Fractional milliseconds, measured with a monotonic clock
    pub duration_ms: f64,
    pub inputs: Value,
    pub outputs: Value,
    /// Per-step extras such as retry_count and attempts
    pub metadata: Value,
    pub success: bool,
    pub error: Option<String>,
}

/// A step that has started but is not yet part of any trace
#[derive(Debug)]
pub struct PendingStep {
    step_name: String,
    start_time: DateTime<Utc>,
    started: Instant,
    inputs: Value,
}

impl PendingStep {
    pub fn start(step_name: impl Into<String>, inputs: Value) -> Self {
        Self {
            step_name: step_name.into(),
            start_time: Utc::now(),
            started: Instant::now(),
            inputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.step_name
    }

    /// Finish successfully
    pub fn succeed(self, outputs: Value, metadata: Value) -> WorkflowStep {
        self.finish(outputs, metadata, None)
    }

    /// Finish with an error; outputs are empty
    pub fn fail(self, error: impl Into<String>, metadata: Value) -> WorkflowStep {
        self.finish(Value::Null, metadata, Some(error.into()))
    }

    fn finish(self, outputs: Value, metadata: Value, error: Option<String>) -> WorkflowStep {
        let elapsed = self.started.elapsed();
        WorkflowStep {
            step_name: self.step_name,
            start_time: self.start_time,
            end_time: Utc::now(),
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            inputs: self.inputs,
            outputs,
            metadata,
            success: error.is_none(),
            error,
        }
    }
}

/// The full record of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTrace {
    pub trace_id: String,
    pub query: String,
    pub steps: Vec<WorkflowStep>,
    pub start_time: DateTime<Utc>,
    /// Set when sealed
    pub total_duration_ms: Option<f64>,
    /// Answer on COMPLETED; generic error summary otherwise
    pub final_response: Option<String>,
    pub status: TraceStatus,
}

impl WorkflowTrace {
    pub fn new(trace_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            query: query.into(),
            steps: Vec::new(),
            start_time: Utc::now(),
            total_duration_ms: None,
            final_response: None,
            status: TraceStatus::Running,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.status.is_sealed()
    }

    /// Names of recorded steps, in order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_name.as_str()).collect()
    }

    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            trace_id: self.trace_id.clone(),
            query: self.query.clone(),
            status: self.status,
            start_time: self.start_time,
            duration_ms: self.total_duration_ms,
            step_count: self.steps.len(),
        }
    }

    /// Stable export shape for visualization and persistence
    pub fn export(&self) -> ExportedTrace {
        ExportedTrace {
            trace_id: self.trace_id.clone(),
            query: self.query.clone(),
            start_time: self.start_time,
            duration_ms: self.total_duration_ms,
            steps: self
                .steps
                .iter()
                .map(|s| ExportedStep {
                    step_name: s.step_name.clone(),
                    inputs: s.inputs.clone(),
                    outputs: s.outputs.clone(),
                    metadata: s.metadata.clone(),
                    success: s.success,
                    duration_ms: s.duration_ms,
                    error: s.error.clone(),
                })
                .collect(),
            final_response: self.final_response.clone(),
            status: self.status,
        }
    }
}

/// Listing entry for `list_traces`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub query: String,
    pub status: TraceStatus,
    pub start_time: DateTime<Utc>,
    pub duration_ms: Option<f64>,
    pub step_count: usize,
}

/// Exported step; the first five fields are the stable contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedStep {
    pub step_name: String,
    pub inputs: Value,
    pub outputs: Value,
    pub metadata: Value,
    pub success: bool,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Exported trace with stable field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedTrace {
    pub trace_id: String,
    pub query: String,
    pub start_time: DateTime<Utc>,
    pub duration_ms: Option<f64>,
    pub steps: Vec<ExportedStep>,
    pub final_response: Option<String>,
    pub status: TraceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_step_records_duration() {
        let pending = PendingStep::start("RETRIEVAL", json!({"query": "q"}));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let step = pending.succeed(json!({"count": 3}), json!({"retry_count": 0}));

        assert!(step.success);
        assert!(step.duration_ms > 0.0);
        assert!(step.end_time >= step.start_time);
        assert_eq!(step.outputs["count"], 3);
    }

    #[test]
    fn test_failed_step() {
        let step = PendingStep::start("GENERATION", json!({})).fail("boom", json!({}));
        assert!(!step.success);
        assert_eq!(step.error.as_deref(), Some("boom"));
        assert_eq!(step.outputs, Value::Null);
    }

    #[test]
    fn test_export_field_names() {
        let mut trace = WorkflowTrace::new("t-1", "What is Azure DevOps?");
        trace
            .steps
            .push(PendingStep::start("RETRIEVAL", json!({})).succeed(json!([]), json!({})));

        let exported = serde_json::to_value(trace.export()).unwrap();
        for field in ["trace_id", "query", "start_time", "duration_ms", "steps", "final_response"] {
            assert!(exported.get(field).is_some(), "missing {}", field);
        }
        for field in ["step_name", "inputs", "outputs", "metadata", "success"] {
            assert!(exported["steps"][0].get(field).is_some(), "missing steps[].{}", field);
        }
        assert_eq!(exported["status"], "RUNNING");
    }

    #[test]
    fn test_sealed_statuses() {
        assert!(!TraceStatus::Running.is_sealed());
        assert!(TraceStatus::Completed.is_sealed());
        assert!(TraceStatus::Failed.is_sealed());
        assert!(TraceStatus::Cancelled.is_sealed());
    }
}
