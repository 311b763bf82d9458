//! Azure OpenAI client for embeddings and chat completions
//!
//! Endpoints:
//! - POST {endpoint}/openai/deployments/{embedding}/embeddings
//! - POST {endpoint}/openai/deployments/{chat}/chat/completions
//!
//! Non-success statuses become classified `ProviderError`s. Response bodies
//! are logged at debug level only and never propagated.

use crate::config::RagConfig;
use crate::errors::{ProviderError, ProviderErrorKind, Result};
use crate::providers::{ChatRequest, EmbeddingProvider, Generation, GenerationProvider, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "azure_openai";

/// HTTP client for one Azure OpenAI resource
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    chat_deployment: String,
    embedding_deployment: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let providers = &config.providers;

        // Attempt timeouts are enforced by the retry layer; this only guards
        // against sockets that never close.
        let client = Client::builder()
            .timeout(Duration::from_millis(config.retry.attempt_timeout_ms * 2))
            .build()?;

        Ok(Self {
            client,
            endpoint: providers.openai_endpoint.trim_end_matches('/').to_string(),
            api_key: providers.openai_api_key.clone(),
            api_version: providers.openai_api_version.clone(),
            chat_deployment: providers.chat_deployment.clone(),
            embedding_deployment: providers.embedding_deployment.clone(),
        })
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}",
            self.endpoint, deployment, operation
        )
    }

    async fn post<T>(&self, url: &str, body: serde_json::Value) -> std::result::Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body_len = detail.len(), "Azure OpenAI request failed");
            return Err(ProviderError::from_status(PROVIDER, status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, &e))
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let url = self.deployment_url(&self.embedding_deployment, "embeddings");
        let response: EmbeddingResponse = self.post(&url, json!({ "input": text })).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                ProviderError::new(PROVIDER, ProviderErrorKind::Decode, "embedding response had no data")
            })
    }
}

#[async_trait]
impl GenerationProvider for AzureOpenAiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &ChatRequest) -> std::result::Result<Generation, ProviderError> {
        let url = self.deployment_url(&self.chat_deployment, "chat/completions");
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role().as_str(), "content": m.content() }))
            .collect();

        let body = json!({
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response: ChatResponse = self.post(&url, body).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::new(PROVIDER, ProviderErrorKind::Decode, "completion had no content")
            })?;

        Ok(Generation {
            text,
            usage: response.usage,
        })
    }
}
