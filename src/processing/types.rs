//! Core data types and error definitions for the ingestion/query pipeline.

use crate::chat::ChatClientError;
use crate::embedding::EmbeddingClientError;
use crate::extract::ExtractError;
use crate::qdrant::QdrantError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors produced while turning segments into semantic chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Embedding provider failed while computing boundary or chunk vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Splitter was configured with a percentile outside `(0, 100]`.
    #[error("Breakpoint percentile {0} is outside (0, 100]")]
    InvalidPercentile(f64),
    /// Splitter was configured with a zero-width buffer.
    #[error("Chunk buffer size must be greater than zero")]
    InvalidBufferSize,
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Raw bytes could not be stored or fetched.
    #[error("Object store failure: {0}")]
    Storage(#[from] StorageError),
    /// Extraction failed to produce segments.
    #[error("Extraction failure: {0}")]
    Extract(#[from] ExtractError),
    /// Semantic chunking failed.
    #[error("Chunking failure: {0}")]
    Chunking(#[from] ChunkingError),
    /// Vector index interaction failed.
    #[error("Vector index failure: {0}")]
    Index(#[from] QdrantError),
}

/// Errors emitted while answering a question.
#[derive(Debug, Error)]
pub enum AskError {
    /// Embedding provider failed to return a vector for the question.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vector for the question")]
    EmptyEmbedding,
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension configured on the server.
        expected: usize,
        /// Actual embedding dimension produced by the provider.
        actual: usize,
    },
    /// Vector search failed.
    #[error("Vector search failure: {0}")]
    Index(#[from] QdrantError),
    /// Language model failed to synthesize an answer.
    #[error("Answer synthesis failure: {0}")]
    Chat(#[from] ChatClientError),
}

/// A chunk produced by the semantic splitter, ready for indexing.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Chunk text.
    pub text: String,
    /// Page the chunk starts on, when known.
    pub page: Option<u32>,
    /// Deterministic hash of the chunk text.
    pub chunk_hash: String,
    /// Embedding vector for the chunk text.
    pub vector: Vec<f32>,
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Storage key the document was persisted under.
    pub key: String,
    /// Public retrieval URL for the stored document.
    pub url: String,
    /// Vector index collection holding the document's chunks.
    pub collection: String,
    /// Number of chunks indexed.
    pub chunk_count: usize,
}
