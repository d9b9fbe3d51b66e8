//! Semantic chunking: embedding-similarity breakpoints over sentences.
//!
//! The splitter works in three passes:
//!
//! 1. Split extracted segments into sentences, keeping page provenance.
//! 2. Embed a sliding buffer of consecutive sentences and compute the cosine
//!    distance between adjacent buffers. A break is inserted wherever the
//!    distance exceeds the configured percentile of all observed distances,
//!    so chunk boundaries land where the topic shifts instead of at fixed
//!    character counts.
//! 3. Re-embed the joined chunk texts so each stored vector represents the
//!    chunk a query will actually retrieve.
//!
//! For a fixed embedding model and input ordering the boundaries are
//! deterministic.

use crate::embedding::EmbeddingClient;
use crate::extract::Segment;
use crate::processing::types::{ChunkRecord, ChunkingError};
use crate::qdrant::compute_chunk_hash;

/// Tunables for the semantic splitter.
#[derive(Debug, Clone)]
pub struct SplitterOptions {
    /// Number of consecutive sentences accumulated per boundary buffer.
    pub buffer_size: usize,
    /// Percentile of inter-buffer distances above which a break is inserted.
    pub breakpoint_percentile: f64,
}

impl Default for SplitterOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            breakpoint_percentile: 95.0,
        }
    }
}

struct Sentence {
    text: String,
    page: Option<u32>,
}

/// Split ordered segments into semantically coherent chunks.
pub async fn split_segments(
    segments: &[Segment],
    embedder: &dyn EmbeddingClient,
    options: &SplitterOptions,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    if options.buffer_size == 0 {
        return Err(ChunkingError::InvalidBufferSize);
    }
    if !(options.breakpoint_percentile > 0.0 && options.breakpoint_percentile <= 100.0) {
        return Err(ChunkingError::InvalidPercentile(
            options.breakpoint_percentile,
        ));
    }

    let sentences: Vec<Sentence> = segments
        .iter()
        .flat_map(|segment| {
            split_sentences(&segment.text)
                .into_iter()
                .map(|text| Sentence {
                    text,
                    page: segment.page,
                })
        })
        .collect();

    if sentences.is_empty() {
        return Ok(Vec::new());
    }

    let boundaries = if sentences.len() == 1 {
        Vec::new()
    } else {
        detect_breakpoints(&sentences, embedder, options).await?
    };

    let chunk_texts = assemble_chunks(&sentences, &boundaries);
    let texts: Vec<String> = chunk_texts.iter().map(|(text, _)| text.clone()).collect();
    let vectors = embedder.generate_embeddings(texts).await?;

    let mut records = Vec::with_capacity(chunk_texts.len());
    let mut seen_hashes = std::collections::HashSet::new();
    let mut skipped = 0usize;
    for ((text, page), vector) in chunk_texts.into_iter().zip(vectors) {
        let chunk_hash = compute_chunk_hash(&text);
        if !seen_hashes.insert(chunk_hash.clone()) {
            skipped += 1;
            continue;
        }
        records.push(ChunkRecord {
            text,
            page,
            chunk_hash,
            vector,
        });
    }
    if skipped > 0 {
        tracing::debug!(skipped, "Dropped duplicate chunks within document");
    }

    Ok(records)
}

/// Embed sentence buffers and return the sentence indexes after which a break occurs.
async fn detect_breakpoints(
    sentences: &[Sentence],
    embedder: &dyn EmbeddingClient,
    options: &SplitterOptions,
) -> Result<Vec<usize>, ChunkingError> {
    let windows: Vec<String> = (0..sentences.len())
        .map(|index| {
            let start = (index + 1).saturating_sub(options.buffer_size);
            sentences[start..=index]
                .iter()
                .map(|sentence| sentence.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let embeddings = embedder.generate_embeddings(windows).await?;

    let distances: Vec<f64> = embeddings
        .windows(2)
        .map(|pair| cosine_distance(&pair[0], &pair[1]))
        .collect();

    let threshold = percentile(&distances, options.breakpoint_percentile);
    Ok(distances
        .iter()
        .enumerate()
        .filter(|(_, distance)| **distance > threshold)
        .map(|(index, _)| index)
        .collect())
}

/// Join sentence runs into chunk texts, breaking after each boundary index.
fn assemble_chunks(
    sentences: &[Sentence],
    boundaries: &[usize],
) -> Vec<(String, Option<u32>)> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_page: Option<u32> = None;

    for (index, sentence) in sentences.iter().enumerate() {
        if current.is_empty() {
            current_page = sentence.page;
        }
        current.push(&sentence.text);
        if boundaries.contains(&index) {
            chunks.push((current.join(" "), current_page));
            current.clear();
        }
    }
    if !current.is_empty() {
        chunks.push((current.join(" "), current_page));
    }
    chunks
}

/// Split text into sentences on terminal punctuation and paragraph breaks.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal =
            matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|next| next.is_whitespace());
        let paragraph_break = c == '\n' && chars.peek() == Some(&'\n');
        if terminal || paragraph_break {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Cosine distance in `[0, 2]`; zero vectors are treated as maximally distant.
fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Linear-interpolation percentile over an unsorted sample.
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingClientError;
    use crate::extract::SegmentKind;
    use async_trait::async_trait;

    /// Maps feline text to one axis and finance text to the orthogonal one.
    struct TopicStubEmbedder;

    #[async_trait]
    impl EmbeddingClient for TopicStubEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(texts
                .into_iter()
                .map(|text| {
                    if text.to_lowercase().contains("cat") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn segment(text: &str, page: u32) -> Segment {
        Segment {
            text: text.to_string(),
            page: Some(page),
            kind: SegmentKind::Text,
        }
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_sentences("First point. Second point! Third?");
        assert_eq!(sentences, vec!["First point.", "Second point!", "Third?"]);
    }

    #[test]
    fn sentences_split_on_paragraph_breaks() {
        let sentences = split_sentences("A heading without punctuation\n\nBody text.");
        assert_eq!(sentences, vec!["A heading without punctuation", "Body text."]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        let sentences = split_sentences("Revenue was 3.5 million. Costs fell.");
        assert_eq!(sentences, vec!["Revenue was 3.5 million.", "Costs fell."]);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [0.0, 1.0];
        assert!((percentile(&values, 50.0) - 0.5).abs() < 1e-9);
        assert!((percentile(&values, 100.0) - 1.0).abs() < 1e-9);
        assert!((percentile(&[0.0, 0.0, 1.0], 95.0) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn cosine_distance_of_orthogonal_vectors_is_one() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-9);
    }

    #[tokio::test]
    async fn splits_at_topic_shift() {
        let segments = [
            segment("Cats purr. Cats nap in the sun.", 1),
            segment("Markets fell sharply. Bond yields dropped.", 2),
        ];
        let chunks = split_segments(&segments, &TopicStubEmbedder, &SplitterOptions::default())
            .await
            .expect("chunks");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Cats purr. Cats nap in the sun.");
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks[1].text, "Markets fell sharply. Bond yields dropped.");
        assert_eq!(chunks[1].page, Some(2));
    }

    #[tokio::test]
    async fn boundaries_are_deterministic() {
        let segments = [
            segment("Cats purr. Cats nap.", 1),
            segment("Markets fell. Yields dropped. Cats returned.", 2),
        ];
        let options = SplitterOptions::default();
        let first = split_segments(&segments, &TopicStubEmbedder, &options)
            .await
            .expect("first run");
        let second = split_segments(&segments, &TopicStubEmbedder, &options)
            .await
            .expect("second run");

        let first_texts: Vec<_> = first.iter().map(|chunk| chunk.text.clone()).collect();
        let second_texts: Vec<_> = second.iter().map(|chunk| chunk.text.clone()).collect();
        assert_eq!(first_texts, second_texts);
    }

    #[tokio::test]
    async fn single_sentence_yields_single_chunk() {
        let segments = [segment("Just one sentence.", 1)];
        let chunks = split_segments(&segments, &TopicStubEmbedder, &SplitterOptions::default())
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Just one sentence.");
        assert!(!chunks[0].chunk_hash.is_empty());
        assert_eq!(chunks[0].vector.len(), 2);
    }

    #[tokio::test]
    async fn empty_segments_yield_no_chunks() {
        let segments = [segment("   ", 1)];
        let chunks = split_segments(&segments, &TopicStubEmbedder, &SplitterOptions::default())
            .await
            .expect("chunks");
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn duplicate_chunks_are_dropped() {
        // Low percentile forces breaks around the middle sentence, producing
        // two identical feline chunks; only one should survive.
        let segments = [
            segment("Cats purr. Cats purr.", 1),
            segment("Markets fell.", 2),
            segment("Cats purr. Cats purr.", 3),
        ];
        let options = SplitterOptions {
            buffer_size: 1,
            breakpoint_percentile: 50.0,
        };
        let chunks = split_segments(&segments, &TopicStubEmbedder, &options)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Cats purr. Cats purr.");
        assert_eq!(chunks[1].text, "Markets fell.");
    }

    #[tokio::test]
    async fn zero_buffer_size_is_rejected() {
        let options = SplitterOptions {
            buffer_size: 0,
            breakpoint_percentile: 95.0,
        };
        let error = split_segments(&[segment("Text.", 1)], &TopicStubEmbedder, &options)
            .await
            .expect_err("invalid buffer");
        assert!(matches!(error, ChunkingError::InvalidBufferSize));
    }
}
