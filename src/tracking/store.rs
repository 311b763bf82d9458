//! Bounded trace store
//!
//! Concurrency model:
//! - Each trace sits behind its own `RwLock` (per-trace exclusion)
//! - The insertion-order list used for eviction has its own `Mutex`
//! - The id → trace map has an `RwLock`
//!
//! Lock order is always index → map → trace, so concurrent append, read and
//! evict cannot deadlock. No lock is held across an await point.
//!
//! Eviction drops the oldest sealed traces once the store exceeds capacity.
//! Running traces are skipped, so the store may briefly exceed capacity when
//! many queries are in flight.

use crate::tracking::workflow::{TraceSummary, WorkflowTrace};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Shared handle to one trace
pub type SharedTrace = Arc<RwLock<WorkflowTrace>>;

/// Default number of traces retained
pub const DEFAULT_CAPACITY: usize = 100;

pub struct TraceStore {
    capacity: usize,
    index: Mutex<VecDeque<String>>,
    traces: RwLock<HashMap<String, SharedTrace>>,
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub(crate) fn read_trace(trace: &SharedTrace) -> RwLockReadGuard<'_, WorkflowTrace> {
    trace.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write_trace(trace: &SharedTrace) -> RwLockWriteGuard<'_, WorkflowTrace> {
    trace.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TraceStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            index: Mutex::new(VecDeque::new()),
            traces: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn index(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn map(&self) -> RwLockReadGuard<'_, HashMap<String, SharedTrace>> {
        self.traces.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn map_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, SharedTrace>> {
        self.traces.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new trace and return its shared handle
    pub fn insert(&self, trace: WorkflowTrace) -> SharedTrace {
        let id = trace.trace_id.clone();
        let shared = Arc::new(RwLock::new(trace));

        {
            let mut index = self.index();
            let mut map = self.map_mut();
            map.insert(id.clone(), shared.clone());
            index.push_back(id);
        }

        self.evict_overflow();
        shared
    }

    pub fn get(&self, trace_id: &str) -> Option<SharedTrace> {
        self.map().get(trace_id).cloned()
    }

    /// Owned copy of a trace
    pub fn snapshot(&self, trace_id: &str) -> Option<WorkflowTrace> {
        self.get(trace_id).map(|trace| read_trace(&trace).clone())
    }

    /// Summaries, most recently started first
    pub fn recent(&self, limit: usize) -> Vec<TraceSummary> {
        let index = self.index();
        let map = self.map();

        index
            .iter()
            .rev()
            .filter_map(|id| map.get(id))
            .take(limit)
            .map(|trace| read_trace(trace).summary())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove oldest sealed traces until within capacity; returns evicted ids
    pub fn evict_overflow(&self) -> Vec<String> {
        let mut index = self.index();
        if index.len() <= self.capacity {
            return Vec::new();
        }

        let mut map = self.map_mut();
        let mut excess = index.len() - self.capacity;
        let mut evicted = Vec::new();
        let mut position = 0;

        while excess > 0 && position < index.len() {
            let sealed = index
                .get(position)
                .and_then(|id| map.get(id))
                .map(|trace| read_trace(trace).is_sealed())
                .unwrap_or(true);

            if sealed {
                if let Some(id) = index.remove(position) {
                    map.remove(&id);
                    evicted.push(id);
                }
                excess -= 1;
            } else {
                position += 1;
            }
        }

        if !evicted.is_empty() {
            debug!(count = evicted.len(), retained = index.len(), "Evicted sealed traces");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::workflow::TraceStatus;

    fn sealed(id: &str) -> WorkflowTrace {
        let mut trace = WorkflowTrace::new(id, "q");
        trace.status = TraceStatus::Completed;
        trace
    }

    #[test]
    fn test_evicts_oldest_sealed() {
        let store = TraceStore::new(2);
        store.insert(sealed("a"));
        store.insert(sealed("b"));
        store.insert(sealed("c"));

        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_none());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn test_running_traces_survive_eviction() {
        let store = TraceStore::new(1);
        store.insert(WorkflowTrace::new("running", "q"));
        store.insert(sealed("done-1"));
        store.insert(sealed("done-2"));

        assert!(store.get("running").is_some());
        assert!(store.get("done-1").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_sealing_later_allows_eviction() {
        let store = TraceStore::new(1);
        let running = store.insert(WorkflowTrace::new("first", "q"));
        store.insert(WorkflowTrace::new("second", "q"));
        assert_eq!(store.len(), 2);

        write_trace(&running).status = TraceStatus::Failed;
        let evicted = store.evict_overflow();

        assert_eq!(evicted, vec!["first".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_recent_is_most_recent_first() {
        let store = TraceStore::new(10);
        for id in ["a", "b", "c"] {
            store.insert(sealed(id));
        }

        let ids: Vec<String> = store.recent(2).into_iter().map(|s| s.trace_id).collect();
        assert_eq!(ids, vec!["c".to_string(), "b".to_string()]);
    }
}
