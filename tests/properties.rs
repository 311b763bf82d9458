//! Property tests
//!
//! Conversation budget, retry accounting and hybrid merge behaviour checked
//! over generated inputs.

use async_trait::async_trait;
use quickcheck_macros::quickcheck;
use ragscope::{
    context::{ConversationContext, HistoryBudget},
    errors::{ProviderError, ProviderErrorKind, RagError},
    providers::{
        offline::{EchoGenerator, HashEmbedder},
        DocumentSearchProvider, ProviderSet, SearchQuery, SearchRequest,
    },
    rag::{build_strategy, retrieval::hybrid::merge, StrategyKind},
    tools::{AttemptLog, RetryPolicy, RetryableClient},
    types::{Role, SearchResult},
};
use std::sync::Arc;
use std::time::Duration;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(8),
        jitter_ratio: 0.0,
        attempt_timeout: Duration::from_secs(1),
        ..RetryPolicy::default()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

// Conversation

#[quickcheck]
fn prop_token_budget_holds_after_every_append(messages: Vec<(bool, String)>, budget: u8) -> bool {
    let budget = budget as usize;
    let mut conversation =
        ConversationContext::with_budget("system prompt", HistoryBudget::Tokens(budget));

    messages.into_iter().all(|(from_user, content)| {
        if from_user {
            conversation.add_user_message(content);
        } else {
            conversation.add_assistant_message(content);
        }

        let context = conversation.get_context_for_generation();
        conversation.estimated_tokens() <= budget
            && context[0].role() == Role::System
            && context[0].content() == "system prompt"
    })
}

#[quickcheck]
fn prop_message_budget_keeps_suffix(count: u8, budget: u8) -> bool {
    let budget = (budget % 16) as usize;
    let mut conversation =
        ConversationContext::with_budget("sys", HistoryBudget::Messages(budget));
    let contents: Vec<String> = (0..count % 32).map(|i| format!("message {}", i)).collect();

    for content in &contents {
        conversation.add_user_message(content.clone());
    }

    let retained: Vec<&str> = conversation.history().map(|m| m.content()).collect();
    let expected: Vec<&str> = contents
        .iter()
        .skip(contents.len().saturating_sub(budget))
        .map(String::as_str)
        .collect();
    retained == expected
}

#[test]
fn test_three_message_budget_after_five_pairs() {
    let mut conversation = ConversationContext::with_budget("sys", HistoryBudget::Messages(3));
    for i in 0..5 {
        conversation.add_user_message(format!("question {}", i));
        conversation.add_assistant_message(format!("answer {}", i));
    }

    let context = conversation.get_context_for_generation();
    let contents: Vec<&str> = context.iter().map(|m| m.content()).collect();
    assert_eq!(contents, vec!["sys", "answer 3", "question 4", "answer 4"]);
    assert_eq!(context[0].role(), Role::System);
}

// Retry

#[quickcheck]
fn prop_transient_failures_below_limit_succeed(failures: u8) -> bool {
    let max_attempts = 5;
    let k = (failures % max_attempts as u8) as u32;
    let embedder = HashEmbedder::default().failing_transiently(k);
    let client = RetryableClient::new(fast_policy(max_attempts));
    let log = AttemptLog::new();

    let result = runtime().block_on(client.call("embedder", &log, || {
        ragscope::providers::EmbeddingProvider::embed(&embedder, "pipelines")
    }));

    result.is_ok() && log.len() == (k + 1) as usize && embedder.calls() == (k + 1) as usize
}

#[test]
fn test_always_failing_exhausts_with_non_decreasing_delays() {
    let embedder = HashEmbedder::default().always_failing(ProviderErrorKind::Server);
    let client = RetryableClient::new(fast_policy(5));
    let log = AttemptLog::new();

    let result = runtime().block_on(client.call("embedder", &log, || {
        ragscope::providers::EmbeddingProvider::embed(&embedder, "pipelines")
    }));

    match result {
        Err(RagError::RetryExhausted { attempts, last_error }) => {
            assert_eq!(attempts, 5);
            assert_eq!(last_error.kind, ProviderErrorKind::Server);
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }

    let records = log.records();
    assert_eq!(records.len(), 5);
    let numbers: Vec<u32> = records.iter().map(|r| r.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    let delays: Vec<u64> = records.iter().filter_map(|r| r.delay_before_next_ms).collect();
    assert_eq!(delays.len(), 4);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]), "delays {:?}", delays);
    assert!(records[4].delay_before_next_ms.is_none());
}

#[quickcheck]
fn prop_policy_delays_are_capped_and_monotonic(base_ms: u16, multiplier: u8, cap_ms: u16) -> bool {
    let policy = RetryPolicy {
        base_delay: Duration::from_millis(base_ms as u64),
        backoff_multiplier: 1.0 + (multiplier % 4) as f64,
        max_delay: Duration::from_millis(cap_ms as u64),
        jitter_ratio: 0.0,
        ..RetryPolicy::default()
    };

    let delays: Vec<Duration> = (1..=8).map(|n| policy.delay_for(n)).collect();
    delays.iter().all(|d| *d <= policy.max_delay) && delays.windows(2).all(|w| w[0] <= w[1])
}

// Hybrid merge

/// Returns one list for vector queries and another for text queries, each
/// after its own delay
struct SkewedSearch {
    vector_delay: Duration,
    text_delay: Duration,
    vector_results: Vec<SearchResult>,
    text_results: Vec<SearchResult>,
}

#[async_trait]
impl DocumentSearchProvider for SkewedSearch {
    fn name(&self) -> &str {
        "skewed_search"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, ProviderError> {
        let (delay, results) = match request.query {
            SearchQuery::Vector(_) => (self.vector_delay, &self.vector_results),
            SearchQuery::Text(_) => (self.text_delay, &self.text_results),
        };
        tokio::time::sleep(delay).await;
        Ok(results.iter().take(request.top_k).cloned().collect())
    }
}

async fn hybrid_with_delays(vector_delay: u64, text_delay: u64) -> Vec<SearchResult> {
    let search = SkewedSearch {
        vector_delay: Duration::from_millis(vector_delay),
        text_delay: Duration::from_millis(text_delay),
        vector_results: vec![
            SearchResult::new("shared", "in both lists", 0.80, "index"),
            SearchResult::new("vector-only", "vector list", 0.85, "index"),
            SearchResult::new("tie-v", "vector tie", 0.60, "index"),
        ],
        text_results: vec![
            SearchResult::new("semantic-only", "semantic list", 0.70, "index"),
            SearchResult::new("tie-s", "semantic tie", 0.60, "index"),
            SearchResult::new("shared", "in both lists", 0.75, "index"),
        ],
    };
    let providers = ProviderSet::new(
        Arc::new(HashEmbedder::default()),
        Arc::new(search),
        Arc::new(EchoGenerator::default()),
    );
    let tools = ragscope::tools::ToolRegistry::new(providers, fast_policy(1));
    let strategy = build_strategy(StrategyKind::Hybrid, tools, 0.1);

    strategy.search("azure", 10, &AttemptLog::new()).await.unwrap()
}

#[tokio::test]
async fn test_hybrid_result_independent_of_completion_order() {
    let vector_first = hybrid_with_delays(1, 30).await;
    let semantic_first = hybrid_with_delays(30, 1).await;

    assert_eq!(vector_first, semantic_first);

    let ids: Vec<&str> = vector_first.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["shared", "vector-only", "semantic-only", "tie-v", "tie-s"]);
    assert!((vector_first[0].score - 0.9).abs() < 1e-9);
    assert_eq!(vector_first[0].source, "hybrid");
}

fn results_from(raw: &[(u8, u16)], source: &str) -> Vec<SearchResult> {
    raw.iter()
        .map(|(id, score)| {
            SearchResult::new(
                format!("doc-{}", id % 12),
                "content",
                *score as f64 / 1000.0,
                source,
            )
        })
        .collect()
}

#[quickcheck]
fn prop_merge_is_bounded_sorted_and_unique(
    vector: Vec<(u8, u16)>,
    semantic: Vec<(u8, u16)>,
    top_k: u8,
) -> bool {
    let top_k = top_k as usize;
    let merged = merge(
        &results_from(&vector, "vector"),
        &results_from(&semantic, "semantic"),
        0.1,
        top_k,
    );

    let mut ids: Vec<&str> = merged.iter().map(|r| r.doc_id.as_str()).collect();
    let sorted = merged.windows(2).all(|w| w[0].score >= w[1].score);
    ids.sort();
    let before = ids.len();
    ids.dedup();

    merged.len() <= top_k && sorted && ids.len() == before
}

#[quickcheck]
fn prop_merge_is_deterministic(vector: Vec<(u8, u16)>, semantic: Vec<(u8, u16)>) -> bool {
    let v = results_from(&vector, "vector");
    let s = results_from(&semantic, "semantic");
    merge(&v, &s, 0.1, 10) == merge(&v, &s, 0.1, 10)
}
