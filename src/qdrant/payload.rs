//! Helpers for constructing and hashing chunk payloads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    text: &str,
    page: Option<u32>,
    source_key: &str,
    chunk_hash: &str,
    timestamp_rfc3339: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(text.to_string()));
    payload.insert("source_key".into(), Value::String(source_key.to_string()));
    payload.insert("chunk_hash".into(), Value::String(chunk_hash.to_string()));
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    if let Some(page) = page {
        payload.insert("page".into(), Value::from(page));
    }
    Value::Object(payload)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier suitable for Qdrant points.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
