//! Retrieval-augmented answer synthesis.

use crate::chat::ChatClient;
use crate::embedding::EmbeddingClient;
use crate::processing::types::AskError;
use crate::qdrant::{QdrantService, ScoredChunk};

/// Fixed instruction framing every answer.
pub const SYSTEM_PROMPT: &str = "You are a knowledgeable assistant trained on specific \
documents. Answer questions based on those documents. If a question is outside of those \
documents, kindly ask the user to rephrase or ask something related to the provided documents.";

/// Answer a question against a single collection.
///
/// Embeds the question with the same model used at ingestion time, retrieves
/// the top-k chunks, and conditions the chat model on the retrieved text.
pub(crate) async fn answer(
    embedder: &dyn EmbeddingClient,
    qdrant: &QdrantService,
    chat: &dyn ChatClient,
    collection: &str,
    question: &str,
    top_k: usize,
    dimension: usize,
) -> Result<String, AskError> {
    let mut vectors = embedder
        .generate_embeddings(vec![question.to_string()])
        .await?;
    let vector = vectors.pop().ok_or(AskError::EmptyEmbedding)?;
    if vector.len() != dimension {
        return Err(AskError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }

    let hits = qdrant.search_points(collection, vector, top_k).await?;
    tracing::debug!(collection, hits = hits.len(), "Retrieved context chunks");

    let prompt = build_user_prompt(&hits, question);
    let answer = chat.complete(SYSTEM_PROMPT, &prompt).await?;
    Ok(answer)
}

/// Assemble the user message from retrieved chunks and the question.
fn build_user_prompt(hits: &[ScoredChunk], question: &str) -> String {
    let mut prompt = String::from("Context from the document:\n---------------------\n");
    for hit in hits {
        if let Some(text) = hit.text.as_deref() {
            prompt.push_str(text);
            prompt.push_str("\n\n");
        }
    }
    prompt.push_str("---------------------\nQuestion: ");
    prompt.push_str(question);
    prompt
}
