//! External provider boundary
//!
//! Three capabilities are consumed, each behind an async trait:
//! - `EmbeddingProvider`: text to vector
//! - `DocumentSearchProvider`: text or vector query to scored documents
//! - `GenerationProvider`: chat messages to text plus usage
//!
//! Implementations report failures as classified `ProviderError`s; retries
//! live one layer up, in the tools.

pub mod azure_openai;
pub mod azure_search;
pub mod offline;

pub use azure_openai::AzureOpenAiClient;
pub use azure_search::AzureSearchClient;

use crate::config::RagConfig;
use crate::errors::{ProviderError, RagError, Result};
use crate::types::{Message, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Text embedding capability
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;
}

/// What a search request matches against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SearchQuery {
    /// Ranked by the provider's semantic relevance model
    Text(String),

    /// Ranked by vector similarity
    Vector(Vec<f32>),
}

/// One document search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: SearchQuery,
    pub top_k: usize,
}

/// Document search capability
#[async_trait]
pub trait DocumentSearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Results in provider order, at most `top_k`
    async fn search(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<Vec<SearchResult>, ProviderError>;
}

/// Chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Token usage reported by the generation provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Generated text with its usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
}

/// Chat generation capability
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ChatRequest)
        -> std::result::Result<Generation, ProviderError>;
}

/// The three providers a pipeline needs
#[derive(Clone)]
pub struct ProviderSet {
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub search: Arc<dyn DocumentSearchProvider>,
    pub generation: Arc<dyn GenerationProvider>,
}

impl ProviderSet {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        search: Arc<dyn DocumentSearchProvider>,
        generation: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            embedding,
            search,
            generation,
        }
    }

    /// Azure OpenAI for embeddings and chat, Azure AI Search for documents
    pub fn azure(config: &RagConfig) -> Result<Self> {
        let providers = &config.providers;
        if providers.openai_endpoint.is_empty() || providers.search_endpoint.is_empty() {
            return Err(RagError::ConfigError(
                "providers.openai_endpoint and providers.search_endpoint are required".to_string(),
            ));
        }

        let openai = Arc::new(AzureOpenAiClient::new(config)?);
        let search = Arc::new(AzureSearchClient::new(config)?);

        Ok(Self {
            embedding: openai.clone(),
            search,
            generation: openai,
        })
    }

    /// Deterministic in-process providers over the bundled sample corpus
    pub fn offline() -> Self {
        let embedder = Arc::new(offline::HashEmbedder::default());
        let corpus = Arc::new(offline::InMemoryCorpus::sample(embedder.clone()));
        let generator = Arc::new(offline::EchoGenerator::default());

        Self {
            embedding: embedder,
            search: corpus,
            generation: generator,
        }
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("embedding", &self.embedding.name())
            .field("search", &self.search.name())
            .field("generation", &self.generation.name())
            .finish()
    }
}
