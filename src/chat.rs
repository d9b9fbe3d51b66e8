//! Chat-completion client used for answer synthesis.
//!
//! Mirrors the embedding adapter: a narrow trait over an OpenAI-compatible
//! `/v1/chat/completions` endpoint, constructed once at startup and shared
//! through the pipeline service.

use crate::config::get_config;
use crate::retry::{BASE_DELAY, MAX_ATTEMPTS, retry_with_backoff};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Errors surfaced while requesting a chat completion.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Request did not complete within the configured timeout.
    #[error("Chat request timed out: {0}")]
    Timeout(String),
    /// HTTP layer failed before a response was received.
    #[error("Chat request failed: {0}")]
    Http(String),
    /// Provider returned an error status.
    #[error("Chat provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body associated with the failure.
        body: String,
    },
    /// Provider response carried no usable completion.
    #[error("Malformed chat response: {0}")]
    InvalidResponse(String),
}

impl ChatClientError {
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

/// Interface implemented by chat-completion backends.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a completion for a system instruction and user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatClientError>;
}

/// OpenAI-compatible chat client.
pub struct OpenAiChatClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
}

impl OpenAiChatClient {
    /// Construct a client from the loaded configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        let http = Client::builder()
            .user_agent("pdfchat/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for chat");
        Self {
            http,
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key: config.openai_api_key.clone(),
            model: config.chat_model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn request_completion(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.1,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(ChatClientError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::UnexpectedStatus { status, body });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|error| ChatClientError::InvalidResponse(error.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatClientError::InvalidResponse("no choices returned".to_string()))
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatClientError> {
        retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || self.request_completion(system, user),
            ChatClientError::is_transient,
        )
        .await
    }
}
