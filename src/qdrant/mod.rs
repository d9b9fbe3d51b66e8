//! Qdrant vector index integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use payload::compute_chunk_hash;
pub use types::{ChunkPoint, QdrantError, ScoredChunk};
