//! Embedding client abstraction and the OpenAI-compatible HTTP adapter.
//!
//! The same client embeds sentence windows during chunking, chunk text before
//! indexing, and questions at query time, so all three stages share one vector
//! space.

use crate::config::get_config;
use crate::retry::{BASE_DELAY, MAX_ATTEMPTS, retry_with_backoff};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Request did not complete within the configured timeout.
    #[error("Embedding request timed out: {0}")]
    Timeout(String),
    /// HTTP layer failed before a response was received.
    #[error("Embedding request failed: {0}")]
    Http(String),
    /// Provider returned an error status.
    #[error("Embedding provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body associated with the failure.
        body: String,
    },
    /// Provider response could not be interpreted.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbeddingClientError {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied span of text.
    ///
    /// The returned vectors preserve input order and all share the configured
    /// dimensionality.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// OpenAI-compatible embeddings client speaking `/v1/embeddings`.
pub struct OpenAiEmbeddingClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Construct a client from the loaded configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        let http = Client::builder()
            .user_agent("pdfchat/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for embeddings");
        Self {
            http,
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key: config.openai_api_key.clone(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }

    async fn request_embeddings(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(EmbeddingClientError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::UnexpectedStatus { status, body });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;

        let mut data = parsed.data;
        // The API does not guarantee response order; `index` does.
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            model = %self.model,
            dimension = self.dimension,
            inputs = texts.len(),
            "Generating embeddings"
        );

        let vectors = retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || self.request_embeddings(&texts),
            EmbeddingClientError::is_transient,
        )
        .await?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected dimension {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        Ok(vectors)
    }
}
