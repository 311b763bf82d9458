//! Pipeline stage state machine
//!
//! Deterministic finite state machine driving one query:
//!
//! ```text
//! RECEIVED → [QUERY_UNDERSTANDING]? → RETRIEVAL → RANKING → GENERATION → COMPLETED
//!     ↘ FAILED | CANCELLED (absorbing, reachable from any non-terminal stage)
//! ```
//!
//! - Safety: no stage is skipped except the optional QUERY_UNDERSTANDING
//! - Liveness: every run ends in COMPLETED, FAILED or CANCELLED
//! - Determinism: unique next stage per (stage, event)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Query accepted, nothing called yet
    Received,

    /// Optional normalisation of the query
    QueryUnderstanding,

    /// Candidate documents fetched by a search strategy
    Retrieval,

    /// Candidates ordered and trimmed to the context budget
    Ranking,

    /// Answer produced by the generation provider
    Generation,

    /// Answer returned (terminal)
    Completed,

    /// A stage failed (terminal)
    Failed,

    /// Cancellation observed at a boundary (terminal)
    Cancelled,
}

/// Events that trigger stage transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Current stage finished; proceed
    Advance,

    /// Current stage raised an error
    Fail,

    /// Cancellation was raised
    Cancel,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed | Stage::Cancelled)
    }

    /// Stable upper-case name used in traces
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Received => "RECEIVED",
            Stage::QueryUnderstanding => "QUERY_UNDERSTANDING",
            Stage::Retrieval => "RETRIEVAL",
            Stage::Ranking => "RANKING",
            Stage::Generation => "GENERATION",
            Stage::Completed => "COMPLETED",
            Stage::Failed => "FAILED",
            Stage::Cancelled => "CANCELLED",
        }
    }

    /// Next stage for an event
    ///
    /// `understand_query` selects whether RECEIVED passes through
    /// QUERY_UNDERSTANDING; the choice is configuration, never per-query.
    /// Terminal stages absorb every event.
    pub fn next(&self, event: StageEvent, understand_query: bool) -> Stage {
        use Stage::*;

        if self.is_terminal() {
            return *self;
        }

        match event {
            StageEvent::Fail => Failed,
            StageEvent::Cancel => Cancelled,
            StageEvent::Advance => match self {
                Received if understand_query => QueryUnderstanding,
                Received => Retrieval,
                QueryUnderstanding => Retrieval,
                Retrieval => Ranking,
                Ranking => Generation,
                Generation => Completed,
                Completed | Failed | Cancelled => *self,
            },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_without_understanding() {
        let mut stage = Stage::Received;
        let mut visited = vec![stage];
        while !stage.is_terminal() {
            stage = stage.next(StageEvent::Advance, false);
            visited.push(stage);
        }

        assert_eq!(
            visited,
            vec![
                Stage::Received,
                Stage::Retrieval,
                Stage::Ranking,
                Stage::Generation,
                Stage::Completed
            ]
        );
    }

    #[test]
    fn test_query_understanding_is_optional() {
        assert_eq!(
            Stage::Received.next(StageEvent::Advance, true),
            Stage::QueryUnderstanding
        );
        assert_eq!(
            Stage::QueryUnderstanding.next(StageEvent::Advance, true),
            Stage::Retrieval
        );
    }

    #[test]
    fn test_fail_and_cancel_from_any_stage() {
        for stage in [
            Stage::Received,
            Stage::QueryUnderstanding,
            Stage::Retrieval,
            Stage::Ranking,
            Stage::Generation,
        ] {
            assert_eq!(stage.next(StageEvent::Fail, false), Stage::Failed);
            assert_eq!(stage.next(StageEvent::Cancel, false), Stage::Cancelled);
        }
    }

    #[test]
    fn test_terminal_stages_absorb() {
        for stage in [Stage::Completed, Stage::Failed, Stage::Cancelled] {
            assert!(stage.is_terminal());
            assert_eq!(stage.next(StageEvent::Advance, false), stage);
            assert_eq!(stage.next(StageEvent::Fail, false), stage);
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::QueryUnderstanding.to_string(), "QUERY_UNDERSTANDING");
        assert_eq!(
            serde_json::to_string(&Stage::Retrieval).unwrap(),
            "\"RETRIEVAL\""
        );
    }
}
