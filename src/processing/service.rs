//! Pipeline coordinator: upload → extract → chunk → index, and
//! question → retrieve → answer.

use crate::{
    chat::{ChatClient, OpenAiChatClient},
    config::get_config,
    embedding::{EmbeddingClient, OpenAiEmbeddingClient},
    extract::{DocumentExtractor, OpenAiDescriber, ParseClient},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::{SplitterOptions, split_segments},
        respond,
        types::{IngestError, IngestOutcome},
    },
    qdrant::{ChunkPoint, QdrantService},
    storage::ObjectStore,
};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reply returned when a question arrives before any document has been ingested.
pub const NO_DOCUMENT_MESSAGE: &str = "Error: No PDF has been processed yet.";

/// Coordinates the full pipeline and owns long-lived handles to every
/// collaborator so the HTTP surface shares one set of clients.
///
/// Construct the service once near process start and share it through an `Arc`.
pub struct PipelineService {
    store: Arc<ObjectStore>,
    extractor: DocumentExtractor,
    embedding_client: Box<dyn EmbeddingClient>,
    chat_client: Box<dyn ChatClient>,
    qdrant_service: QdrantService,
    splitter: SplitterOptions,
    metrics: Arc<PipelineMetrics>,
    // Most recently ingested collection. Reads and writes go through the lock,
    // so an ask racing an ingest sees either the old or the new name, never a
    // torn value.
    recent_collection: RwLock<Option<String>>,
}

/// Abstraction over the pipeline used by the transport layer.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Store, extract, chunk, and index an uploaded document.
    async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestOutcome, IngestError>;

    /// Answer a question against the supplied collection, or the most recently
    /// ingested one when none is given. Failures come back as reply text.
    async fn ask(&self, question: &str, collection: Option<String>) -> String;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl PipelineService {
    /// Build a new pipeline service from the loaded configuration.
    pub fn new() -> Result<Self, crate::qdrant::QdrantError> {
        let config = get_config();
        let store = Arc::new(ObjectStore::from_config());
        let extractor = DocumentExtractor::new(
            Arc::clone(&store),
            ParseClient::from_config(),
            Box::new(OpenAiDescriber::from_config()),
        );
        Ok(Self {
            store,
            extractor,
            embedding_client: Box::new(OpenAiEmbeddingClient::from_config()),
            chat_client: Box::new(OpenAiChatClient::from_config()),
            qdrant_service: QdrantService::new()?,
            splitter: SplitterOptions {
                buffer_size: config.chunk_buffer_size,
                breakpoint_percentile: config.breakpoint_percentile,
            },
            metrics: Arc::new(PipelineMetrics::new()),
            recent_collection: RwLock::new(None),
        })
    }

    /// Assemble a service from explicit collaborators.
    pub fn from_parts(
        store: Arc<ObjectStore>,
        extractor: DocumentExtractor,
        embedding_client: Box<dyn EmbeddingClient>,
        chat_client: Box<dyn ChatClient>,
        qdrant_service: QdrantService,
        splitter: SplitterOptions,
    ) -> Self {
        Self {
            store,
            extractor,
            embedding_client,
            chat_client,
            qdrant_service,
            splitter,
            metrics: Arc::new(PipelineMetrics::new()),
            recent_collection: RwLock::new(None),
        }
    }

    /// Store, extract, chunk, and index an uploaded document.
    pub async fn ingest(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, IngestError> {
        let key = derive_storage_key(filename);
        let collection = collection_name_for_key(&key);
        tracing::info!(filename, key = %key, collection = %collection, "Ingesting document");

        self.store.put_object(&key, bytes).await?;
        let url = self.store.public_url(&key);

        let segments = self.extractor.extract(&key).await?;
        let chunks =
            split_segments(&segments, self.embedding_client.as_ref(), &self.splitter).await?;

        let points: Vec<ChunkPoint> = chunks
            .into_iter()
            .map(|chunk| ChunkPoint {
                text: chunk.text,
                page: chunk.page,
                source_key: key.clone(),
                chunk_hash: chunk.chunk_hash,
                vector: chunk.vector,
            })
            .collect();

        let dimension = self.embedding_dimension() as u64;
        self.qdrant_service
            .create_collection_if_not_exists(&collection, dimension)
            .await?;
        let chunk_count = self
            .qdrant_service
            .upsert_chunks(&collection, points)
            .await?;

        *self.recent_collection.write().await = Some(collection.clone());
        self.metrics.record_document(chunk_count as u64);
        tracing::info!(
            key = %key,
            collection = %collection,
            chunks = chunk_count,
            "Document indexed"
        );

        Ok(IngestOutcome {
            url,
            key,
            collection,
            chunk_count,
        })
    }

    /// Answer a question, resolving the target collection first.
    ///
    /// Every failure past this point is folded into the reply string; the chat
    /// surface never sees a transport-level error for a query.
    pub async fn ask(&self, question: &str, collection: Option<String>) -> String {
        self.metrics.record_question();

        let resolved = match collection {
            Some(name) => Some(name),
            None => self.recent_collection.read().await.clone(),
        };
        let Some(collection) = resolved else {
            return NO_DOCUMENT_MESSAGE.to_string();
        };

        match respond::answer(
            self.embedding_client.as_ref(),
            &self.qdrant_service,
            self.chat_client.as_ref(),
            &collection,
            question,
            self.search_top_k(),
            self.embedding_dimension(),
        )
        .await
        {
            Ok(answer) => answer,
            Err(error) => {
                tracing::warn!(collection = %collection, error = %error, "Query failed");
                format!("Error: {error}")
            }
        }
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn embedding_dimension(&self) -> usize {
        get_config().embedding_dimension
    }

    fn search_top_k(&self) -> usize {
        get_config().search_top_k
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestOutcome, IngestError> {
        PipelineService::ingest(self, filename, bytes).await
    }

    async fn ask(&self, question: &str, collection: Option<String>) -> String {
        PipelineService::ask(self, question, collection).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}

/// Derive a unique storage key: original stem, a 6-digit disambiguator, and
/// the original extension.
pub(crate) fn derive_storage_key(filename: &str) -> String {
    // Multipart filenames may carry client-side path components.
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    let suffix = rand::rng().random_range(100_000..=999_999);
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => {
            format!("{stem}_{suffix}.{extension}")
        }
        _ => format!("{name}_{suffix}"),
    }
}

/// Collection name derived from a storage key: lower-cased, extension stripped.
pub(crate) fn collection_name_for_key(key: &str) -> String {
    let stem = match key.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => key,
    };
    stem.to_lowercase()
}
