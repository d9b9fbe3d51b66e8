use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and chat activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents ingested since startup.
    pub documents_ingested: u64,
    /// Total chunk count produced across all ingested documents.
    pub chunks_indexed: u64,
    /// Number of chat questions handled since startup.
    pub questions_answered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
    }

    #[test]
    fn records_questions() {
        let metrics = PipelineMetrics::new();
        metrics.record_question();
        metrics.record_question();
        assert_eq!(metrics.snapshot().questions_answered, 2);
    }
}
