//! Document extraction: object store fetch, structured parsing, and
//! best-effort multimodal description of embedded images.

pub mod describe;
pub mod parse;

pub use describe::{DESCRIBE_INSTRUCTION, DescribeError, ImageDescriber, OpenAiDescriber};
pub use parse::{ParseClient, ParseError, ParsedDocument, ParsedPage};

use crate::storage::{ObjectStore, StorageError};
use std::sync::Arc;
use thiserror::Error;

/// Origin of a segment's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Native text extracted from the page.
    Text,
    /// Description of an embedded image or chart.
    ImageDescription,
}

/// A contiguous span of extracted text, tagged with provenance.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Extracted text content.
    pub text: String,
    /// One-based page number the text came from.
    pub page: Option<u32>,
    /// Whether the text is native page text or an image description.
    pub kind: SegmentKind,
}

/// Errors surfaced while extracting a document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The raw bytes could not be fetched from the object store.
    #[error("Failed to fetch document: {0}")]
    Storage(#[from] StorageError),
    /// The parsing service failed.
    #[error("Failed to parse document: {0}")]
    Parse(#[from] ParseError),
    /// Parsing succeeded but produced no usable text.
    #[error("Document '{0}' contained no extractable text")]
    EmptyDocument(String),
}

/// Turns a storage key into an ordered sequence of text segments.
///
/// Page text is taken from the parsing service as-is. Each embedded image is
/// fetched and passed through the multimodal describer; a failure there is
/// logged and skipped so one bad image never sinks the whole document.
pub struct DocumentExtractor {
    store: Arc<ObjectStore>,
    parser: ParseClient,
    describer: Box<dyn ImageDescriber>,
}

impl DocumentExtractor {
    /// Assemble an extractor from its collaborators.
    pub fn new(
        store: Arc<ObjectStore>,
        parser: ParseClient,
        describer: Box<dyn ImageDescriber>,
    ) -> Self {
        Self {
            store,
            parser,
            describer,
        }
    }

    /// Fetch the document stored under `key` and produce ordered segments.
    pub async fn extract(&self, key: &str) -> Result<Vec<Segment>, ExtractError> {
        let bytes = self.store.get_object(key).await?;
        tracing::debug!(key, size = bytes.len(), "Fetched document from object store");

        let parsed = self.parser.parse_document(key, bytes).await?;

        let mut segments = Vec::new();
        for page in &parsed.pages {
            if !page.text.trim().is_empty() {
                segments.push(Segment {
                    text: page.text.trim().to_string(),
                    page: Some(page.page),
                    kind: SegmentKind::Text,
                });
            }

            for image in &page.images {
                let bytes = match self.parser.fetch_image(&parsed.job_id, &image.name).await {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        tracing::warn!(
                            key,
                            page = page.page,
                            image = %image.name,
                            error = %error,
                            "Image fetch failed; continuing without it"
                        );
                        continue;
                    }
                };
                match self.describer.describe(&bytes).await {
                    Ok(description) if !description.trim().is_empty() => {
                        segments.push(Segment {
                            text: description.trim().to_string(),
                            page: Some(page.page),
                            kind: SegmentKind::ImageDescription,
                        });
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(
                            key,
                            page = page.page,
                            image = %image.name,
                            error = %error,
                            "Image description failed; continuing without it"
                        );
                    }
                }
            }
        }

        if segments.is_empty() {
            return Err(ExtractError::EmptyDocument(key.to_string()));
        }

        tracing::info!(key, segments = segments.len(), "Document extracted");
        Ok(segments)
    }
}
