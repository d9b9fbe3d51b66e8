//! Client for the hosted document parsing service.
//!
//! The service follows an async-job shape: upload the raw PDF, poll the job
//! until it settles, then fetch the structured per-page result. Page images
//! referenced by the result can be fetched individually for multimodal
//! description.

use crate::config::get_config;
use crate::retry::{BASE_DELAY, MAX_ATTEMPTS, retry_with_backoff};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PARSE_URL: &str = "https://api.cloud.llamaindex.ai";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_POLLS: u32 = 120;

/// Errors surfaced by the parsing service client.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Request did not complete within the configured timeout.
    #[error("Parse request timed out: {0}")]
    Timeout(String),
    /// HTTP layer failed before a response was received.
    #[error("Parse request failed: {0}")]
    Http(String),
    /// Service responded with an unexpected status code.
    #[error("Parse service returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: u16,
        /// Response body associated with the failure.
        body: String,
    },
    /// The parsing job settled in a failed state.
    #[error("Parse job {job_id} failed with status {status}")]
    JobFailed {
        /// Identifier of the failed job.
        job_id: String,
        /// Terminal status reported by the service.
        status: String,
    },
    /// The job did not settle within the polling budget.
    #[error("Parse job {0} did not complete in time")]
    PollExhausted(String),
    /// Service response could not be interpreted.
    #[error("Malformed parse response: {0}")]
    InvalidResponse(String),
}

impl ParseError {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
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

/// One page of the structured parsing result.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedPage {
    /// One-based page number.
    pub page: u32,
    /// Native text extracted from the page.
    #[serde(default)]
    pub text: String,
    /// Images embedded on the page, referenced by name.
    #[serde(default)]
    pub images: Vec<ParsedImage>,
}

/// Reference to an image extracted from a page.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedImage {
    /// Name under which the image can be fetched from the job result.
    pub name: String,
}

/// Completed parse: the job identifier plus ordered pages.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Job identifier, needed to fetch page images.
    pub job_id: String,
    /// Pages in document order.
    pub pages: Vec<ParsedPage>,
}

/// HTTP client for the parsing service.
pub struct ParseClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) poll_interval: Duration,
    pub(crate) max_polls: u32,
}

impl ParseClient {
    /// Construct a client from the loaded configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        let http = Client::builder()
            .user_agent("pdfchat/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for parsing");
        Self {
            http,
            base_url: config
                .parse_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_PARSE_URL.to_string()),
            api_key: config.parse_api_key.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Upload a document, wait for the job to settle, and fetch the result.
    pub async fn parse_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<ParsedDocument, ParseError> {
        let job_id = self.upload(filename, bytes).await?;
        tracing::debug!(job_id = %job_id, filename, "Parse job created");
        self.wait_for_job(&job_id).await?;
        let pages = self.fetch_result(&job_id).await?;
        tracing::debug!(job_id = %job_id, pages = pages.len(), "Parse job completed");
        Ok(ParsedDocument { job_id, pages })
    }

    /// Fetch the bytes of a page image referenced by a parse result.
    pub async fn fetch_image(&self, job_id: &str, name: &str) -> Result<Vec<u8>, ParseError> {
        let url = self.endpoint(&format!("api/v1/parsing/job/{job_id}/result/image/{name}"));
        let response = retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || async {
                self.http
                    .get(&url)
                    .bearer_auth(&self.api_key)
                    .send()
                    .await
                    .map_err(ParseError::from_reqwest)
            },
            ParseError::is_transient,
        )
        .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::UnexpectedStatus { status, body });
        }

        Ok(response
            .bytes()
            .await
            .map_err(ParseError::from_reqwest)?
            .to_vec())
    }

    // Not retried: every attempt creates a fresh parse job on the provider.
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ParseError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|error| ParseError::InvalidResponse(error.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("parse_mode", "parse_page_with_lvm")
            .text("result_type", "json");

        let response = self
            .http
            .post(self.endpoint("api/v1/parsing/upload"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(ParseError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::UnexpectedStatus { status, body });
        }

        let job: JobStatus = response
            .json()
            .await
            .map_err(|error| ParseError::InvalidResponse(error.to_string()))?;
        Ok(job.id)
    }

    async fn wait_for_job(&self, job_id: &str) -> Result<(), ParseError> {
        let url = self.endpoint(&format!("api/v1/parsing/job/{job_id}"));
        for _ in 0..self.max_polls {
            let job = retry_with_backoff(
                MAX_ATTEMPTS,
                BASE_DELAY,
                || self.poll_job(&url),
                ParseError::is_transient,
            )
            .await?;

            match job.status.to_uppercase().as_str() {
                "SUCCESS" => return Ok(()),
                "PENDING" | "RUNNING" => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                other => {
                    return Err(ParseError::JobFailed {
                        job_id: job_id.to_string(),
                        status: other.to_string(),
                    });
                }
            }
        }
        Err(ParseError::PollExhausted(job_id.to_string()))
    }

    async fn poll_job(&self, url: &str) -> Result<JobStatus, ParseError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ParseError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::UnexpectedStatus { status, body });
        }

        response
            .json()
            .await
            .map_err(|error| ParseError::InvalidResponse(error.to_string()))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<Vec<ParsedPage>, ParseError> {
        let url = self.endpoint(&format!("api/v1/parsing/job/{job_id}/result/json"));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ParseError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::UnexpectedStatus { status, body });
        }

        let result: JobResult = response
            .json()
            .await
            .map_err(|error| ParseError::InvalidResponse(error.to_string()))?;

        let mut pages = result.pages;
        pages.sort_by_key(|page| page.page);
        Ok(pages)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct JobStatus {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct JobResult {
    #[serde(default)]
    pages: Vec<ParsedPage>,
}
