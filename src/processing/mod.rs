//! Ingestion and query pipeline: semantic chunking, retrieval, and the
//! coordinator tying the stages together.

pub mod chunking;
pub mod respond;
pub mod service;
pub mod types;

pub use chunking::{SplitterOptions, split_segments};
pub use respond::SYSTEM_PROMPT;
pub use service::{NO_DOCUMENT_MESSAGE, PipelineApi, PipelineService};
pub use types::{AskError, ChunkRecord, ChunkingError, IngestError, IngestOutcome};
