//! Multimodal describer for images and charts embedded in documents.

use crate::config::get_config;
use crate::retry::{BASE_DELAY, MAX_ATTEMPTS, retry_with_backoff};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Fixed instruction applied to every image passed through the describer.
pub const DESCRIBE_INSTRUCTION: &str = "Extract everything from this image, including text, \
tables, charts, and any other relevant content. Provide concise yet informative descriptions \
for images and highlight patterns in charts. Ensure no information is skipped.";

/// Errors surfaced while describing an image.
#[derive(Debug, Error)]
pub enum DescribeError {
    /// Request did not complete within the configured timeout.
    #[error("Describe request timed out: {0}")]
    Timeout(String),
    /// HTTP layer failed before a response was received.
    #[error("Describe request failed: {0}")]
    Http(String),
    /// Provider returned an error status.
    #[error("Describer returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body associated with the failure.
        body: String,
    },
    /// Provider response carried no usable description.
    #[error("Malformed describer response: {0}")]
    InvalidResponse(String),
}

impl DescribeError {
    fn is_transient(&self) -> bool {
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

/// Interface implemented by multimodal describers.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    /// Produce a textual description of the supplied image bytes.
    async fn describe(&self, image: &[u8]) -> Result<String, DescribeError>;
}

/// Multimodal describer backed by an OpenAI-compatible vision model.
pub struct OpenAiDescriber {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
}

impl OpenAiDescriber {
    /// Construct a describer from the loaded configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        let http = Client::builder()
            .user_agent("pdfchat/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for describer");
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

    async fn request_description(&self, image: &[u8]) -> Result<String, DescribeError> {
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(image));
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": DESCRIBE_INSTRUCTION },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
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
            .map_err(DescribeError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DescribeError::UnexpectedStatus { status, body });
        }

        let parsed: DescribeResponse = response
            .json()
            .await
            .map_err(|error| DescribeError::InvalidResponse(error.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| DescribeError::InvalidResponse("no choices returned".to_string()))
    }
}

#[derive(Deserialize)]
struct DescribeResponse {
    choices: Vec<DescribeChoice>,
}

#[derive(Deserialize)]
struct DescribeChoice {
    message: DescribeMessage,
}

#[derive(Deserialize)]
struct DescribeMessage {
    content: String,
}

#[async_trait]
impl ImageDescriber for OpenAiDescriber {
    async fn describe(&self, image: &[u8]) -> Result<String, DescribeError> {
        retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || self.request_description(image),
            DescribeError::is_transient,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn sends_instruction_and_data_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains("data:image/png;base64,")
                    .body_contains("highlight patterns in charts");
                then.status(200).json_body(serde_json::json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "A bar chart of revenue." } }
                    ]
                }));
            })
            .await;

        let describer = OpenAiDescriber {
            http: Client::builder()
                .user_agent("pdfchat-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: "test-key".into(),
            model: "gpt-4o-mini".into(),
        };

        let description = describer.describe(b"pngbytes").await.expect("description");
        mock.assert();
        assert_eq!(description, "A bar chart of revenue.");
    }
}
