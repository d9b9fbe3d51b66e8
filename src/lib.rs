#![deny(missing_docs)]

//! Core library for the PDF chat service: ingest PDFs into a vector store and
//! answer questions about them with retrieval-augmented generation.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat-completion client abstraction and adapters.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF parsing and multimodal content extraction.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// S3-compatible object storage client.
pub mod storage;

mod retry;
