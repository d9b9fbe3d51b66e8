//! HTTP client wrapper for interacting with Qdrant.

use crate::config::get_config;
use crate::qdrant::payload::{build_payload, current_timestamp_rfc3339, generate_point_id};
use crate::qdrant::types::{
    ChunkPoint, QdrantError, QueryPoint, QueryResponse, QueryResponseResult, ScoredChunk,
};
use crate::retry::{BASE_DELAY, MAX_ATTEMPTS, retry_with_backoff};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, QdrantError> {
        let config = get_config();
        let client = Client::builder()
            .user_agent("pdfchat/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(QdrantError::from_reqwest)?;

        let base_url = normalize_base_url(&config.qdrant_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized Qdrant HTTP client");

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size).await
    }

    /// Create or update a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await
            .map_err(QdrantError::from_reqwest)?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection ensured/created");
        })
        .await
    }

    /// Upsert chunk vectors and payloads into the given collection.
    ///
    /// Returns the number of points written.
    pub async fn upsert_chunks(
        &self,
        collection_name: &str,
        chunks: Vec<ChunkPoint>,
    ) -> Result<usize, QdrantError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let payload = build_payload(
                    &chunk.text,
                    chunk.page,
                    &chunk.source_key,
                    &chunk.chunk_hash,
                    &now,
                );
                json!({
                    "id": generate_point_id(),
                    "vector": chunk.vector,
                    "payload": payload,
                })
            })
            .collect();

        let point_count = serialized.len();
        let body = json!({ "points": serialized });

        let response = retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || async {
                self.request(
                    Method::PUT,
                    &format!("collections/{collection_name}/points"),
                )
                .query(&[("wait", true)])
                .json(&body)
                .send()
                .await
                .map_err(QdrantError::from_reqwest)
            },
            QdrantError::is_transient,
        )
        .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Chunks indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Perform a similarity search against a collection, returning scored chunks.
    ///
    /// Searching a collection that does not exist yields
    /// [`QdrantError::CollectionNotFound`] rather than an empty result set.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || async {
                self.request(
                    Method::POST,
                    &format!("collections/{collection_name}/points/query"),
                )
                .json(&body)
                .send()
                .await
                .map_err(QdrantError::from_reqwest)
            },
            QdrantError::is_transient,
        )
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(QdrantError::CollectionNotFound(collection_name.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response
            .json()
            .await
            .map_err(QdrantError::from_reqwest)?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points.into_iter().map(into_scored_chunk).collect())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        retry_with_backoff(
            MAX_ATTEMPTS,
            BASE_DELAY,
            || self.check_collection(collection_name),
            QdrantError::is_transient,
        )
        .await
    }

    async fn check_collection(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await
            .map_err(QdrantError::from_reqwest)?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn into_scored_chunk(point: QueryPoint) -> ScoredChunk {
    let payload = point.payload.unwrap_or_default();
    let text = payload
        .get("text")
        .and_then(|value| value.as_str())
        .map(str::to_string);
    let page = payload
        .get("page")
        .and_then(Value::as_u64)
        .map(|value| value as u32);
    ScoredChunk {
        id: stringify_point_id(point.id),
        score: point.score,
        text,
        page,
    }
}

// Point ids come back as either strings or integers.
fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(id) => id,
        other => other.to_string(),
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
