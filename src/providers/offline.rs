//! Deterministic in-process providers
//!
//! Used by the binary's `--offline` mode and by tests. Every provider carries
//! a `CallScript` that can inject failures and latency, count calls, and run
//! a hook while a call is in flight.

use crate::context::TokenCounter;
use crate::errors::{ProviderError, ProviderErrorKind};
use crate::providers::{
    ChatRequest, DocumentSearchProvider, EmbeddingProvider, Generation, GenerationProvider,
    SearchQuery, SearchRequest, Usage,
};
use crate::types::{sort_results, SearchResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default embedding width
const DEFAULT_DIMENSIONS: usize = 64;

type CallHook = Arc<dyn Fn() + Send + Sync>;

/// Scripted behaviour shared by the offline providers
#[derive(Default)]
pub struct CallScript {
    calls: AtomicUsize,
    transient_failures: AtomicU32,
    always_fail: Mutex<Option<ProviderErrorKind>>,
    latency: Duration,
    hook: Option<CallHook>,
}

impl CallScript {
    /// Count the call, run the hook, wait out the latency, then apply any
    /// scripted failure
    async fn enter(&self, provider: &str) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(hook) = &self.hook {
            hook();
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let always = *self
            .always_fail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(kind) = always {
            return Err(ProviderError::new(provider, kind, "scripted failure"));
        }

        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(ProviderError::new(
                provider,
                ProviderErrorKind::Server,
                "scripted transient failure",
            ));
        }

        Ok(())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Builder methods shared by every scripted provider
macro_rules! scripted {
    ($ty:ty) => {
        impl $ty {
            /// Fail the next `n` calls with a transient server error
            pub fn failing_transiently(self, n: u32) -> Self {
                self.script.transient_failures.store(n, Ordering::SeqCst);
                self
            }

            /// Fail every call with `kind`
            pub fn always_failing(self, kind: ProviderErrorKind) -> Self {
                *self
                    .script
                    .always_fail
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(kind);
                self
            }

            /// Delay every call
            pub fn with_latency(mut self, latency: Duration) -> Self {
                self.script.latency = latency;
                self
            }

            /// Run `hook` at the start of every call
            pub fn on_call<F>(mut self, hook: F) -> Self
            where
                F: Fn() + Send + Sync + 'static,
            {
                self.script.hook = Some(Arc::new(hook));
                self
            }

            /// Calls received so far, failed ones included
            pub fn calls(&self) -> usize {
                self.script.calls()
            }
        }
    };
}

/// Bag-of-words embedder using feature hashing
pub struct HashEmbedder {
    dimensions: usize,
    script: CallScript,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

scripted!(HashEmbedder);

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            script: CallScript::default(),
        }
    }

    /// Unit-length embedding of `text`; the zero vector for text without terms
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for term in terms(text) {
            let bucket = (fnv1a(&term) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "offline_embedder"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.script.enter(self.name()).await?;
        Ok(self.vectorize(text))
    }
}

struct StoredDocument {
    doc_id: String,
    content: String,
    vector: Vec<f32>,
    terms: HashSet<String>,
}

/// Searchable in-memory document collection
///
/// Vector queries score by cosine similarity, text queries by the share of
/// query terms present in the document. Zero scores are not returned.
pub struct InMemoryCorpus {
    embedder: Arc<HashEmbedder>,
    documents: Vec<StoredDocument>,
    script: CallScript,
}

scripted!(InMemoryCorpus);

impl InMemoryCorpus {
    pub fn new(embedder: Arc<HashEmbedder>) -> Self {
        Self {
            embedder,
            documents: Vec::new(),
            script: CallScript::default(),
        }
    }

    /// Add a document; its vector comes from the corpus embedder
    pub fn with_document(mut self, doc_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        self.documents.push(StoredDocument {
            doc_id: doc_id.into(),
            vector: self.embedder.vectorize(&content),
            terms: terms(&content).collect(),
            content,
        });
        self
    }

    /// Small Azure DevOps corpus for demos
    pub fn sample(embedder: Arc<HashEmbedder>) -> Self {
        Self::new(embedder)
            .with_document(
                "devops-overview",
                "Azure DevOps is a set of developer services for planning work, \
                 collaborating on code, and building and deploying applications.",
            )
            .with_document(
                "pipelines-yaml",
                "Azure Pipelines builds and deploys code. Pipelines are defined in YAML \
                 with stages, jobs and steps, and run on Microsoft-hosted or self-hosted agents.",
            )
            .with_document(
                "repos-branch-policies",
                "Branch policies in Azure Repos require pull request reviews, linked work \
                 items and successful builds before code is merged.",
            )
            .with_document(
                "boards-work-items",
                "Azure Boards tracks work with work items such as epics, features, user \
                 stories and bugs on Kanban boards and sprint backlogs.",
            )
            .with_document(
                "artifacts-feeds",
                "Azure Artifacts hosts package feeds for NuGet, npm, Maven and Python \
                 packages and integrates with pipelines for publishing.",
            )
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn score(&self, query: &SearchQuery, document: &StoredDocument) -> f64 {
        match query {
            SearchQuery::Vector(vector) => cosine(vector, &document.vector),
            SearchQuery::Text(text) => {
                let query_terms: HashSet<String> = terms(text).collect();
                if query_terms.is_empty() {
                    return 0.0;
                }
                let hits = query_terms.intersection(&document.terms).count();
                hits as f64 / query_terms.len() as f64
            }
        }
    }
}

#[async_trait]
impl DocumentSearchProvider for InMemoryCorpus {
    fn name(&self) -> &str {
        "offline_corpus"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, ProviderError> {
        self.script.enter(self.name()).await?;

        let mut results: Vec<SearchResult> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let score = self.score(&request.query, doc);
                (score > 0.0).then(|| {
                    SearchResult::new(doc.doc_id.clone(), doc.content.clone(), score, self.name())
                })
            })
            .collect();

        sort_results(&mut results);
        results.truncate(request.top_k);
        Ok(results)
    }
}

/// Search provider returning a fixed result list for any query, best first
pub struct StaticSearch {
    results: Vec<SearchResult>,
    script: CallScript,
}

scripted!(StaticSearch);

impl StaticSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            script: CallScript::default(),
        }
    }
}

#[async_trait]
impl DocumentSearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static_search"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, ProviderError> {
        self.script.enter(self.name()).await?;
        let mut results = self.results.clone();
        sort_results(&mut results);
        results.truncate(request.top_k);
        Ok(results)
    }
}

/// Generator describing the prompt it was given
pub struct EchoGenerator {
    counter: TokenCounter,
    script: CallScript,
}

impl Default for EchoGenerator {
    fn default() -> Self {
        Self {
            counter: TokenCounter::new(),
            script: CallScript::default(),
        }
    }
}

scripted!(EchoGenerator);

#[async_trait]
impl GenerationProvider for EchoGenerator {
    fn name(&self) -> &str {
        "echo_generator"
    }

    async fn generate(&self, request: &ChatRequest) -> Result<Generation, ProviderError> {
        self.script.enter(self.name()).await?;

        let context_chars: usize = request
            .messages
            .iter()
            .map(|m| m.content().chars().count())
            .sum();
        let text = format!(
            "Received {} messages with {} characters of context.",
            request.messages.len(),
            context_chars
        );

        let prompt_tokens = self.counter.estimate_messages(request.messages.iter()) as u32;
        let completion_tokens = self.counter.estimate(&text) as u32;

        Ok(Generation {
            text,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}

/// Lower-cased alphanumeric terms
fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(term: &str) -> u64 {
    term.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn test_embedding_is_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Azure Pipelines YAML").await.unwrap();
        let b = embedder.embed("azure pipelines yaml").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_corpus_vector_search_finds_related_document() {
        let embedder = Arc::new(HashEmbedder::default());
        let corpus = InMemoryCorpus::sample(embedder.clone());
        let vector = embedder.vectorize("branch policies pull request reviews");

        let results = corpus
            .search(&SearchRequest {
                query: SearchQuery::Vector(vector),
                top_k: 2,
            })
            .await
            .unwrap();

        assert!(results.len() <= 2);
        assert_eq!(results[0].doc_id, "repos-branch-policies");
    }

    #[tokio::test]
    async fn test_corpus_text_search_scores_term_overlap() {
        let corpus = InMemoryCorpus::new(Arc::new(HashEmbedder::default()))
            .with_document("a", "kanban boards")
            .with_document("b", "yaml pipelines");

        let results = corpus
            .search(&SearchRequest {
                query: SearchQuery::Text("yaml pipelines".to_string()),
                top_k: 5,
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "b");
        assert_eq!(results[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_scripted_transient_failures() {
        let search = StaticSearch::new(vec![SearchResult::new("a", "x", 0.5, "static")])
            .failing_transiently(2);
        let request = SearchRequest {
            query: SearchQuery::Text("q".to_string()),
            top_k: 1,
        };

        assert!(search.search(&request).await.is_err());
        assert!(search.search(&request).await.is_err());
        assert_eq!(search.search(&request).await.unwrap().len(), 1);
        assert_eq!(search.calls(), 3);
    }

    #[tokio::test]
    async fn test_always_failing_kind() {
        let generator = EchoGenerator::default().always_failing(ProviderErrorKind::Auth);
        let err = generator
            .generate(&ChatRequest {
                messages: vec![Message::user("hi")],
                temperature: 0.0,
                max_tokens: 10,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_echo_reports_context_length() {
        let generation = EchoGenerator::default()
            .generate(&ChatRequest {
                messages: vec![Message::system("abcd"), Message::user("ef")],
                temperature: 0.0,
                max_tokens: 10,
            })
            .await
            .unwrap();
        assert!(generation.text.contains("2 messages"));
        assert!(generation.text.contains("6 characters"));
        assert_eq!(generation.usage.prompt_tokens, 2);
    }

    #[test]
    fn test_hook_runs_per_call() {
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = seen.clone();
        let embedder = HashEmbedder::default().on_call(move || {
            observer.fetch_add(1, Ordering::SeqCst);
        });

        tokio_test::block_on(async {
            embedder.embed("a").await.unwrap();
            embedder.embed("b").await.unwrap();
        });
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
