// Trace persistence sinks
use crate::errors::{RagError, Result};
use crate::tracking::workflow::{ExportedTrace, WorkflowStep};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Receives every trace once it is sealed
///
/// `persist` may block; it runs on the blocking pool.
pub trait TraceSink: Send + Sync + 'static {
    fn persist(&self, trace: &ExportedTrace) -> Result<()>;

    /// Called after each step is appended, outside the trace lock
    fn on_step(&self, _trace_id: &str, _step: &WorkflowStep) {}
}

/// One pretty-printed JSON file per trace: `<dir>/<trace_id>.json`
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    /// Create the sink, creating `dir` if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, trace_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", trace_id))
    }

    /// Load one exported trace
    pub fn load(&self, trace_id: &str) -> Result<ExportedTrace> {
        // Ids are uuids; anything with a path separator cannot be one of ours
        if trace_id.contains(|c: char| c == '/' || c == '\\') || trace_id.contains("..") {
            return Err(RagError::TraceNotFound(trace_id.to_string()));
        }

        let path = self.path_for(trace_id);
        if !path.is_file() {
            return Err(RagError::TraceNotFound(trace_id.to_string()));
        }

        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Exported traces, most recent start time first
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn list(&self, limit: usize) -> Result<Vec<ExportedTrace>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut traces = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(RagError::from)
                .and_then(|json| serde_json::from_str::<ExportedTrace>(&json).map_err(RagError::from))
            {
                Ok(trace) => traces.push(trace),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable trace file"),
            }
        }

        traces.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        traces.truncate(limit);
        Ok(traces)
    }
}

impl TraceSink for JsonFileSink {
    fn persist(&self, trace: &ExportedTrace) -> Result<()> {
        let json = serde_json::to_string_pretty(trace)?;
        fs::write(self.path_for(&trace.trace_id), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::workflow::{TraceStatus, WorkflowTrace};
    use chrono::Duration;

    fn exported(id: &str, offset_secs: i64) -> ExportedTrace {
        let mut trace = WorkflowTrace::new(id, format!("query {}", id));
        trace.start_time = trace.start_time + Duration::seconds(offset_secs);
        trace.status = TraceStatus::Completed;
        trace.final_response = Some("answer".to_string());
        trace.export()
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("traces")).unwrap();

        let trace = exported("t1", 0);
        sink.persist(&trace).unwrap();

        assert_eq!(sink.load("t1").unwrap(), trace);
    }

    #[test]
    fn test_missing_trace() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        assert!(matches!(sink.load("nope"), Err(RagError::TraceNotFound(_))));
        assert!(matches!(sink.load("../etc/passwd"), Err(RagError::TraceNotFound(_))));
    }

    #[test]
    fn test_list_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        sink.persist(&exported("old", -60)).unwrap();
        sink.persist(&exported("new", 60)).unwrap();
        sink.persist(&exported("mid", 0)).unwrap();
        fs::write(dir.path().join("junk.json"), "{not json").unwrap();

        let ids: Vec<String> = sink.list(2).unwrap().into_iter().map(|t| t.trace_id).collect();
        assert_eq!(ids, vec!["new".to_string(), "mid".to_string()]);
    }
}
