//! Azure AI Search document provider
//!
//! POST {endpoint}/indexes/{index}/docs/search
//!
//! - Vector queries send a `vectorQueries` block against the configured field
//! - Text queries use `queryType: semantic`; the reranker score is preferred
//!   over the base `@search.score`

use crate::config::RagConfig;
use crate::errors::{ProviderError, Result};
use crate::providers::{DocumentSearchProvider, SearchQuery, SearchRequest};
use crate::types::SearchResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "azure_search";

/// HTTP client for one search index
#[derive(Debug, Clone)]
pub struct AzureSearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    index: String,
    vector_field: String,
    semantic_configuration: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "@search.score", default)]
    score: f64,
    #[serde(rename = "@search.rerankerScore", default)]
    reranker_score: Option<f64>,
}

impl AzureSearchClient {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let providers = &config.providers;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.retry.attempt_timeout_ms * 2))
            .build()?;

        Ok(Self {
            client,
            endpoint: providers.search_endpoint.trim_end_matches('/').to_string(),
            api_key: providers.search_api_key.clone(),
            api_version: providers.search_api_version.clone(),
            index: providers.search_index.clone(),
            vector_field: providers.vector_field.clone(),
            semantic_configuration: providers.semantic_configuration.clone(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/indexes/{}/docs/search", self.endpoint, self.index)
    }

    /// Request body for a search call
    fn request_body(&self, request: &SearchRequest) -> Value {
        match &request.query {
            SearchQuery::Vector(vector) => json!({
                "select": "id,content",
                "top": request.top_k,
                "vectorQueries": [{
                    "kind": "vector",
                    "vector": vector,
                    "fields": self.vector_field,
                    "k": request.top_k,
                }],
            }),
            SearchQuery::Text(text) => json!({
                "search": text,
                "queryType": "semantic",
                "semanticConfiguration": self.semantic_configuration,
                "select": "id,content",
                "top": request.top_k,
            }),
        }
    }
}

impl SearchHit {
    fn into_result(self) -> SearchResult {
        let score = self.reranker_score.unwrap_or(self.score);
        SearchResult::new(self.id, self.content, score, PROVIDER)
    }
}

#[async_trait]
impl DocumentSearchProvider for AzureSearchClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<Vec<SearchResult>, ProviderError> {
        let response = self
            .client
            .post(self.search_url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), index = %self.index, "Search request failed");
            return Err(ProviderError::from_status(PROVIDER, status.as_u16()));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, &e))?;

        Ok(parsed
            .value
            .into_iter()
            .take(request.top_k)
            .map(SearchHit::into_result)
            .collect())
    }
}
