//! Agent orchestrator - main coordinator
//!
//! Drives one query through the stage machine:
//! - Opens a trace and records one step per completed stage
//! - Runs each stage under an aggregate timeout
//! - Checks cancellation at every stage boundary
//! - Seals the trace and returns an answer or a single structured error

use crate::agent::cancel::CancelToken;
use crate::agent::state::{Stage, StageEvent};
use crate::config::RagConfig;
use crate::context::{ConversationContext, TokenCounter};
use crate::errors::{ErrorKind, ProcessError, RagError, Result};
use crate::providers::{ProviderSet, Usage};
use crate::rag::retrieval::{build_strategy, SearchStrategy, StrategyKind};
use crate::rag::PromptBuilder;
use crate::tools::types::{GenerateInput, RankInput};
use crate::tools::{AttemptLog, Tool, ToolRegistry};
use crate::tracking::{
    JsonFileSink, PendingStep, TraceHandle, TraceStatus, TraceSummary, WorkflowTrace,
    WorkflowTracer,
};
use crate::types::SearchResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Successful result of `process`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,

    /// Doc ids placed in the prompt, in rank order
    pub citations: Vec<String>,

    pub trace_id: String,

    /// Documents that survived ranking
    pub documents: Vec<SearchResult>,

    pub usage: Usage,
}

/// What the pipeline produced before sealing
struct Outcome {
    answer: String,
    citations: Vec<String>,
    documents: Vec<SearchResult>,
    usage: Usage,
}

/// A failure tagged with the stage it happened in
struct StageFailure {
    stage: Stage,
    error: RagError,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(RagError) -> StageFailure {
        move |error| StageFailure { stage, error }
    }
}

/// Main agent orchestrator
///
/// Cheap to share behind an `Arc`; independent queries may run concurrently.
pub struct Orchestrator {
    config: Arc<RagConfig>,
    tools: ToolRegistry,
    strategy: Arc<dyn SearchStrategy>,
    fallback: Option<Arc<dyn SearchStrategy>>,
    tracer: WorkflowTracer,
    prompts: PromptBuilder,
    counter: TokenCounter,
}

impl Orchestrator {
    /// Build tools, strategies and tracer from configuration
    pub fn new(config: Arc<RagConfig>, providers: ProviderSet) -> Result<Self> {
        let tools = ToolRegistry::new(providers, config.retry_policy());

        let mut tracer = WorkflowTracer::with_capacity(config.traces.capacity);
        if let Some(dir) = config.export_dir() {
            tracer = tracer.with_sink(Arc::new(JsonFileSink::new(dir)?));
        }

        let strategy = build_strategy(config.search.strategy, tools.clone(), config.search.overlap_bonus);
        let fallback = config
            .search
            .fallback
            .filter(|kind| *kind != config.search.strategy)
            .map(|kind| build_strategy(kind, tools.clone(), config.search.overlap_bonus));

        Ok(Self {
            config,
            tools,
            strategy,
            fallback,
            tracer,
            prompts: PromptBuilder::new(),
            counter: TokenCounter::new(),
        })
    }

    /// Replace the tracer, e.g. to share one store between orchestrators
    pub fn with_tracer(mut self, tracer: WorkflowTracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Override the configured primary strategy
    pub fn with_strategy(mut self, kind: StrategyKind) -> Self {
        self.strategy = build_strategy(kind, self.tools.clone(), self.config.search.overlap_bonus);
        self
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tracer(&self) -> &WorkflowTracer {
        &self.tracer
    }

    /// Summaries of retained traces, most recent first
    pub fn list_traces(&self, limit: usize) -> Vec<TraceSummary> {
        self.tracer.list_traces(limit)
    }

    pub fn get_trace(&self, trace_id: &str) -> Result<WorkflowTrace> {
        self.tracer.get_trace(trace_id)
    }

    /// Answer `query` within `conversation`
    pub async fn process(
        &self,
        query: &str,
        conversation: &mut ConversationContext,
    ) -> std::result::Result<Answer, ProcessError> {
        self.process_with_cancel(query, conversation, &CancelToken::new())
            .await
    }

    /// Answer `query`, observing `cancel` at stage boundaries
    ///
    /// On success the query and the answer are appended to `conversation`.
    /// On failure the conversation is untouched.
    #[instrument(skip_all, fields(strategy = %self.strategy.kind()))]
    pub async fn process_with_cancel(
        &self,
        query: &str,
        conversation: &mut ConversationContext,
        cancel: &CancelToken,
    ) -> std::result::Result<Answer, ProcessError> {
        let trace = self.tracer.begin(query);
        info!(trace_id = %trace.id(), "Processing query");

        match self.run_pipeline(&trace, query, conversation, cancel).await {
            Ok(outcome) => {
                // The trace is ours alone; sealing a RUNNING trace cannot fail
                if let Err(e) = trace
                    .seal(TraceStatus::Completed, Some(outcome.answer.clone()))
                    .await
                {
                    warn!(trace_id = %trace.id(), error = %e, "Could not seal trace");
                }

                conversation.add_user_message(query);
                conversation.add_assistant_message(outcome.answer.clone());

                info!(
                    trace_id = %trace.id(),
                    citations = outcome.citations.len(),
                    "Query completed"
                );
                Ok(Answer {
                    answer: outcome.answer,
                    citations: outcome.citations,
                    trace_id: trace.id().to_string(),
                    documents: outcome.documents,
                    usage: outcome.usage,
                })
            }
            Err(failure) => Err(self.finish_with_error(&trace, failure).await),
        }
    }

    async fn run_pipeline(
        &self,
        trace: &TraceHandle,
        query: &str,
        conversation: &ConversationContext,
        cancel: &CancelToken,
    ) -> std::result::Result<Outcome, StageFailure> {
        let understand = self.config.pipeline.query_understanding;
        let mut stage = Stage::Received;

        self.check_query(query).map_err(StageFailure::at(stage))?;
        let mut query = query.to_string();

        stage = self.advance(stage, cancel, understand)?;
        if stage == Stage::QueryUnderstanding {
            query = self
                .understand_query(trace, &query)
                .await
                .map_err(StageFailure::at(stage))?;
            stage = self.advance(stage, cancel, understand)?;
        }

        let candidates = self
            .retrieve(trace, &query)
            .await
            .map_err(StageFailure::at(stage))?;
        stage = self.advance(stage, cancel, understand)?;

        let documents = self
            .rank(trace, candidates)
            .await
            .map_err(StageFailure::at(stage))?;
        stage = self.advance(stage, cancel, understand)?;

        let outcome = self
            .generate(trace, &query, documents, conversation)
            .await
            .map_err(StageFailure::at(stage))?;
        self.advance(stage, cancel, understand)?;

        Ok(outcome)
    }

    /// Stage boundary: observe cancellation, then move on
    fn advance(
        &self,
        stage: Stage,
        cancel: &CancelToken,
        understand: bool,
    ) -> std::result::Result<Stage, StageFailure> {
        let next = stage.next(StageEvent::Advance, understand);
        if cancel.is_cancelled() {
            info!(before = %next, "Cancellation observed");
            return Err(StageFailure {
                stage,
                error: RagError::Cancelled { stage: next },
            });
        }
        info!(stage = %next, "Stage started");
        Ok(next)
    }

    fn check_query(&self, query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidQuery("query is empty".to_string()));
        }
        let max = self.config.pipeline.max_query_chars;
        if query.chars().count() > max {
            return Err(RagError::InvalidQuery(format!(
                "query exceeds {} characters",
                max
            )));
        }
        Ok(())
    }

    /// Run one stage under the aggregate timeout and record its step
    async fn run_stage<T, F>(
        &self,
        trace: &TraceHandle,
        stage: Stage,
        inputs: Value,
        log: &AttemptLog,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<(T, Value)>>,
    {
        let pending = PendingStep::start(stage.name(), inputs);
        let stage_timeout = self.config.stage_timeout();

        let result = match timeout(stage_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(RagError::StageTimeout {
                stage,
                timeout_ms: stage_timeout.as_millis() as u64,
            }),
        };

        let metadata = json!({
            "retry_count": log.retry_count(),
            "attempts": log.records(),
        });

        match result {
            Ok((value, outputs)) => {
                trace.append_step(pending.succeed(outputs, metadata))?;
                Ok(value)
            }
            Err(error) => {
                trace.append_step(pending.fail(error.public_summary(), metadata))?;
                Err(error)
            }
        }
    }

    async fn understand_query(&self, trace: &TraceHandle, query: &str) -> Result<String> {
        let log = AttemptLog::new();
        self.run_stage(
            trace,
            Stage::QueryUnderstanding,
            json!({ "query": query }),
            &log,
            async {
                let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
                let outputs = json!({ "normalized_query": normalized });
                Ok((normalized, outputs))
            },
        )
        .await
    }

    async fn retrieve(&self, trace: &TraceHandle, query: &str) -> Result<Vec<SearchResult>> {
        let top_k = self.config.search.top_k;
        let log = AttemptLog::new();
        let inputs = json!({
            "query": query,
            "top_k": top_k,
            "strategy": self.strategy.kind(),
        });

        self.run_stage(trace, Stage::Retrieval, inputs, &log, async {
            let (results, used, fallback_used) =
                match self.strategy.search(query, top_k, &log).await {
                    Ok(results) => (results, self.strategy.kind(), false),
                    Err(error @ RagError::SearchUnavailable { .. }) => match &self.fallback {
                        Some(fallback) => {
                            warn!(
                                primary = %self.strategy.kind(),
                                fallback = %fallback.kind(),
                                error = %error.public_summary(),
                                "Primary strategy unavailable, using configured fallback"
                            );
                            let results = fallback.search(query, top_k, &log).await?;
                            (results, fallback.kind(), true)
                        }
                        None => return Err(error),
                    },
                    Err(error) => return Err(error),
                };

            let outputs = json!({
                "strategy_used": used,
                "fallback_used": fallback_used,
                "count": results.len(),
                "results": results
                    .iter()
                    .map(|r| json!({ "doc_id": r.doc_id, "score": r.score, "source": r.source }))
                    .collect::<Vec<_>>(),
            });
            Ok((results, outputs))
        })
        .await
    }

    async fn rank(&self, trace: &TraceHandle, candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        let budget_tokens = self.config.ranking.context_budget_tokens;
        let log = AttemptLog::new();
        let inputs = json!({
            "candidates": candidates
                .iter()
                .map(|c| json!({ "doc_id": c.doc_id, "score": c.score }))
                .collect::<Vec<_>>(),
            "budget_tokens": budget_tokens,
        });

        self.run_stage(trace, Stage::Ranking, inputs, &log, async {
            let ranked = self
                .tools
                .rank()
                .execute(
                    RankInput {
                        candidates,
                        budget_tokens,
                    },
                    &log,
                )
                .await?;

            let outputs = json!({
                "kept": ranked.kept.iter().map(|d| d.doc_id.as_str()).collect::<Vec<_>>(),
                "dropped": ranked.dropped,
                "used_tokens": ranked.used_tokens,
            });
            Ok((ranked.kept, outputs))
        })
        .await
    }

    async fn generate(
        &self,
        trace: &TraceHandle,
        query: &str,
        documents: Vec<SearchResult>,
        conversation: &ConversationContext,
    ) -> Result<Outcome> {
        let prompt = self
            .prompts
            .build(conversation.get_context_for_generation(), &documents, query);
        let log = AttemptLog::new();
        let inputs = json!({
            "message_count": prompt.messages.len(),
            "citations": prompt.citations,
            "estimated_prompt_tokens": self.counter.estimate_messages(prompt.messages.iter()),
        });

        let generation = &self.config.generation;
        self.run_stage(trace, Stage::Generation, inputs, &log, async {
            let output = self
                .tools
                .generate()
                .execute(
                    GenerateInput {
                        messages: prompt.messages,
                        temperature: generation.temperature,
                        max_tokens: generation.max_tokens,
                    },
                    &log,
                )
                .await?;

            let outputs = json!({
                "answer": output.text,
                "usage": output.usage,
            });
            let outcome = Outcome {
                answer: output.text,
                citations: prompt.citations,
                documents,
                usage: output.usage,
            };
            Ok((outcome, outputs))
        })
        .await
    }

    /// Seal the trace FAILED or CANCELLED and build the caller's error
    async fn finish_with_error(&self, trace: &TraceHandle, failure: StageFailure) -> ProcessError {
        let StageFailure { stage, error } = failure;

        let (event, kind) = match &error {
            RagError::Cancelled { .. } => (StageEvent::Cancel, ErrorKind::Cancelled),
            RagError::StageTimeout { .. } => (StageEvent::Fail, ErrorKind::StageTimeout),
            RagError::InvalidQuery(_) => (StageEvent::Fail, ErrorKind::QueryError),
            _ => (StageEvent::Fail, error_kind_for(stage)),
        };

        let terminal = stage.next(event, self.config.pipeline.query_understanding);
        let (status, final_response) = match terminal {
            Stage::Cancelled => (TraceStatus::Cancelled, None),
            _ => (TraceStatus::Failed, Some(error.public_summary())),
        };

        if let Err(e) = trace.seal(status, final_response).await {
            warn!(trace_id = %trace.id(), error = %e, "Could not seal trace");
        }

        warn!(
            trace_id = %trace.id(),
            stage = %stage,
            kind = %kind,
            error = %error.public_summary(),
            "Query did not complete"
        );
        ProcessError::new(kind, trace.id(), error)
    }
}

/// Caller-facing kind for a failure inside `stage`
fn error_kind_for(stage: Stage) -> ErrorKind {
    match stage {
        Stage::Received | Stage::QueryUnderstanding => ErrorKind::QueryError,
        Stage::Retrieval | Stage::Ranking => ErrorKind::RetrievalError,
        Stage::Generation | Stage::Completed | Stage::Failed | Stage::Cancelled => {
            ErrorKind::GenerationError
        }
    }
}
