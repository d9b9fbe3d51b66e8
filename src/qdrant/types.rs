//! Shared types used by the Qdrant client and helpers.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// Request did not complete within the configured timeout.
    #[error("Qdrant request timed out: {0}")]
    Timeout(String),
    /// HTTP layer failed before receiving a response.
    #[error("Qdrant request failed: {0}")]
    Http(String),
    /// The addressed collection does not exist.
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: u16,
        /// Body payload associated with the failing response.
        body: String,
    },
}

impl QdrantError {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidUrl(_) | Self::CollectionNotFound(_) => false,
        }
    }

    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}

/// Prepared chunk ready for indexing: text, provenance, hash, and vector.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Raw chunk text.
    pub text: String,
    /// Page of the source document the chunk starts on, when known.
    pub page: Option<u32>,
    /// Storage key of the document the chunk came from.
    pub source_key: String,
    /// Deterministic hash of the chunk used for dedupe.
    pub chunk_hash: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Scored chunk returned by similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Stored chunk text, when present in the payload.
    pub text: Option<String>,
    /// Stored page provenance, when present in the payload.
    pub page: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
