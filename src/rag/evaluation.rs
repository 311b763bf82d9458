//! Search strategy evaluation
//!
//! Runs every strategy over the same queries and compares them:
//! - Latency: mean, min, max and sample standard deviation over repeated runs
//! - Relevance: precision, recall and F1 against expected doc_ids
//! - Verdict: fastest strategy, most relevant strategy, and an overall pick
//!
//! Relevance is judged on the first run's results. Cases come from a JSON
//! list of `{query, expected_results?, top_k?}` objects.

use crate::errors::{RagError, Result};
use crate::rag::retrieval::{build_strategy, SearchStrategy, StrategyKind};
use crate::tools::{AttemptLog, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Latency gap above which the verdict notes a slower but more relevant pick
const NOTABLE_GAP_MS: f64 = 50.0;

/// One query to evaluate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,

    /// Doc ids a good answer should retrieve; empty skips relevance
    #[serde(default)]
    pub expected_results: Vec<String>,

    /// Overrides the evaluator's result count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl EvalCase {
    pub fn new(query: impl Into<String>, expected_results: Vec<String>) -> Self {
        Self {
            query: query.into(),
            expected_results,
            top_k: None,
        }
    }

    /// Load a JSON list of cases; every case needs a non-blank query
    pub fn load_file(path: &Path) -> Result<Vec<EvalCase>> {
        let content = fs::read_to_string(path)?;
        let cases: Vec<EvalCase> = serde_json::from_str(&content)?;

        if let Some(index) = cases.iter().position(|c| c.query.trim().is_empty()) {
            return Err(RagError::InvalidQuery(format!(
                "case {} in {} has no query",
                index,
                path.display()
            )));
        }
        Ok(cases)
    }
}

/// Relevance of one result list against the expected doc ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relevance {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub relevant_retrieved: usize,
    pub total_relevant: usize,
}

impl Relevance {
    /// `None` when nothing is expected
    pub fn measure(retrieved: &[String], expected: &[String]) -> Option<Self> {
        let expected: HashSet<&str> = expected.iter().map(String::as_str).collect();
        if expected.is_empty() {
            return None;
        }

        let retrieved: HashSet<&str> = retrieved.iter().map(String::as_str).collect();
        let relevant_retrieved = retrieved.intersection(&expected).count();

        let precision = if retrieved.is_empty() {
            0.0
        } else {
            relevant_retrieved as f64 / retrieved.len() as f64
        };
        let recall = relevant_retrieved as f64 / expected.len() as f64;
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Some(Self {
            precision,
            recall,
            f1,
            relevant_retrieved,
            total_relevant: expected.len(),
        })
    }
}

/// Latency over repeated runs, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Sample standard deviation; 0 for a single run
    pub std_dev_ms: f64,
    pub runs: usize,
}

impl LatencyStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std_dev = if samples.len() > 1 {
            let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean_ms: mean,
            min_ms: min,
            max_ms: max,
            std_dev_ms: std_dev,
            runs: samples.len(),
        })
    }
}

/// How one strategy did on one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodEvaluation {
    pub strategy: StrategyKind,

    /// Doc ids of the first run, best first
    pub results: Vec<String>,

    pub latency: Option<LatencyStats>,

    pub relevance: Option<Relevance>,

    /// Set when any run failed; latency and relevance are then absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MethodEvaluation {
    fn failed(strategy: StrategyKind, error: &RagError) -> Self {
        Self {
            strategy,
            results: Vec::new(),
            latency: None,
            relevance: None,
            error: Some(error.public_summary()),
        }
    }

    fn mean_ms(&self) -> Option<f64> {
        self.latency.as_ref().map(|l| l.mean_ms)
    }

    fn f1(&self) -> Option<f64> {
        self.relevance.as_ref().map(|r| r.f1)
    }
}

/// Which strategy to prefer for a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub for_performance: Option<StrategyKind>,
    pub for_relevance: Option<StrategyKind>,
    /// Relevance when it could be judged, performance otherwise
    pub overall: Option<StrategyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Verdict {
    pub fn from_methods(methods: &[MethodEvaluation]) -> Self {
        let fastest = pick(methods, |m| m.mean_ms().map(|ms| -ms));
        let most_relevant = pick(methods, MethodEvaluation::f1);

        let notes = match (fastest, most_relevant) {
            (Some(fast), Some(relevant)) if fast.strategy != relevant.strategy => {
                match (fast.mean_ms(), relevant.mean_ms()) {
                    (Some(fast_ms), Some(relevant_ms)) if relevant_ms - fast_ms > NOTABLE_GAP_MS => {
                        Some(format!(
                            "{} search is {:.0}ms slower than {} search but has better relevance",
                            relevant.strategy,
                            relevant_ms - fast_ms,
                            fast.strategy
                        ))
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        let for_performance = fastest.map(|m| m.strategy);
        let for_relevance = most_relevant.map(|m| m.strategy);
        Self {
            for_performance,
            for_relevance,
            overall: for_relevance.or(for_performance),
            notes,
        }
    }
}

/// Highest `key`; ties keep the earlier method
fn pick<F>(methods: &[MethodEvaluation], key: F) -> Option<&MethodEvaluation>
where
    F: Fn(&MethodEvaluation) -> Option<f64>,
{
    let mut best: Option<(&MethodEvaluation, f64)> = None;
    for method in methods {
        if let Some(value) = key(method) {
            if best.map_or(true, |(_, top)| value > top) {
                best = Some((method, value));
            }
        }
    }
    best.map(|(method, _)| method)
}

/// Every strategy's result for one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvaluation {
    pub query: String,
    pub top_k: usize,
    pub methods: Vec<MethodEvaluation>,
    pub verdict: Verdict,
}

impl QueryEvaluation {
    pub fn method(&self, strategy: StrategyKind) -> Option<&MethodEvaluation> {
        self.methods.iter().find(|m| m.strategy == strategy)
    }
}

/// Averages for one strategy across a case set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    pub strategy: StrategyKind,
    /// Cases the strategy answered without error
    pub succeeded: usize,
    pub failed: usize,
    pub avg_latency_ms: Option<f64>,
    pub avg_precision: Option<f64>,
    pub avg_recall: Option<f64>,
    pub avg_f1: Option<f64>,
}

impl MethodSummary {
    fn aggregate(strategy: StrategyKind, queries: &[QueryEvaluation]) -> Self {
        let evaluations: Vec<&MethodEvaluation> =
            queries.iter().filter_map(|q| q.method(strategy)).collect();
        let latencies: Vec<f64> = evaluations.iter().filter_map(|m| m.mean_ms()).collect();
        let relevance: Vec<&Relevance> =
            evaluations.iter().filter_map(|m| m.relevance.as_ref()).collect();

        Self {
            strategy,
            succeeded: evaluations.iter().filter(|m| m.error.is_none()).count(),
            failed: evaluations.iter().filter(|m| m.error.is_some()).count(),
            avg_latency_ms: average(latencies.iter().copied()),
            avg_precision: average(relevance.iter().map(|r| r.precision)),
            avg_recall: average(relevance.iter().map(|r| r.recall)),
            avg_f1: average(relevance.iter().map(|r| r.f1)),
        }
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Result of a whole case set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEvaluation {
    pub query_count: usize,
    pub methods: Vec<MethodSummary>,
    /// Best average F1, or lowest average latency when nothing had expectations
    pub best_method: Option<StrategyKind>,
    pub queries: Vec<QueryEvaluation>,
}

/// Compares vector, semantic and hybrid search over the same tools
pub struct SearchEvaluator {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    top_k: usize,
    runs: usize,
}

impl SearchEvaluator {
    pub fn new(tools: ToolRegistry, overlap_bonus: f64) -> Self {
        let strategies = [StrategyKind::Vector, StrategyKind::Semantic, StrategyKind::Hybrid]
            .into_iter()
            .map(|kind| build_strategy(kind, tools.clone(), overlap_bonus))
            .collect();

        Self {
            strategies,
            top_k: 5,
            runs: 3,
        }
    }

    /// Result count for cases without their own `top_k`
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Timed runs per strategy and case; at least one
    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs.max(1);
        self
    }

    pub async fn evaluate_query(&self, case: &EvalCase) -> QueryEvaluation {
        let top_k = case.top_k.unwrap_or(self.top_k);
        let mut methods = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let evaluation = self.benchmark(strategy.as_ref(), case, top_k).await;
            debug!(
                strategy = %evaluation.strategy,
                mean_ms = ?evaluation.mean_ms(),
                f1 = ?evaluation.f1(),
                "Strategy evaluated"
            );
            methods.push(evaluation);
        }

        let verdict = Verdict::from_methods(&methods);
        info!(query = %case.query, overall = ?verdict.overall, "Query evaluated");

        QueryEvaluation {
            query: case.query.clone(),
            top_k,
            methods,
            verdict,
        }
    }

    pub async fn evaluate_set(&self, cases: &[EvalCase]) -> SetEvaluation {
        let mut queries = Vec::with_capacity(cases.len());
        for case in cases {
            queries.push(self.evaluate_query(case).await);
        }

        let methods: Vec<MethodSummary> = self
            .strategies
            .iter()
            .map(|s| MethodSummary::aggregate(s.kind(), &queries))
            .collect();

        let best_by_f1 = best_summary(&methods, |m| m.avg_f1);
        let best_method =
            best_by_f1.or_else(|| best_summary(&methods, |m| m.avg_latency_ms.map(|ms| -ms)));

        info!(queries = queries.len(), best = ?best_method, "Evaluation finished");
        SetEvaluation {
            query_count: queries.len(),
            methods,
            best_method,
            queries,
        }
    }

    async fn benchmark(
        &self,
        strategy: &dyn SearchStrategy,
        case: &EvalCase,
        top_k: usize,
    ) -> MethodEvaluation {
        let mut samples = Vec::with_capacity(self.runs);
        let mut first_run: Option<Vec<String>> = None;

        for run in 0..self.runs {
            let started = Instant::now();
            match strategy.search(&case.query, top_k, &AttemptLog::new()).await {
                Ok(results) => {
                    samples.push(started.elapsed().as_secs_f64() * 1000.0);
                    if first_run.is_none() {
                        first_run = Some(results.into_iter().map(|r| r.doc_id).collect());
                    }
                }
                Err(e) => {
                    warn!(strategy = %strategy.kind(), run, error = %e, "Evaluation run failed");
                    return MethodEvaluation::failed(strategy.kind(), &e);
                }
            }
        }

        let results = first_run.unwrap_or_default();
        MethodEvaluation {
            strategy: strategy.kind(),
            relevance: Relevance::measure(&results, &case.expected_results),
            latency: LatencyStats::from_samples(&samples),
            results,
            error: None,
        }
    }
}

fn best_summary<F>(methods: &[MethodSummary], key: F) -> Option<StrategyKind>
where
    F: Fn(&MethodSummary) -> Option<f64>,
{
    let mut best: Option<(StrategyKind, f64)> = None;
    for method in methods {
        if let Some(value) = key(method) {
            if best.map_or(true, |(_, top)| value > top) {
                best = Some((method.strategy, value));
            }
        }
    }
    best.map(|(strategy, _)| strategy)
}
