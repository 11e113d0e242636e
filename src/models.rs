//! Core data types used throughout askdocs.
//!
//! These types represent document chunks, queries, and answers as they flow
//! through the ingestion and question-answering pipeline.

use serde::{Deserialize, Serialize};

/// Source-file metadata attached to every chunk derived from one document.
///
/// Metadata is document-level, not chunk-specific: every chunk produced from
/// the same upload carries an identical copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Original file name as uploaded.
    pub filename: String,
    /// Lowercased file extension including the dot (e.g. `".pdf"`).
    pub filetype: String,
    /// File size in bytes.
    pub size: u64,
    /// Upload timestamp, RFC 3339.
    pub date: String,
}

/// A bounded-size span of document text plus its source metadata.
///
/// Immutable once created. The pipeline owns chunks only until they are
/// handed to the vector index, which is the system of record thereafter.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Read projection of an indexed vector returned by nearest-neighbor search.
///
/// `metadata` is the flattened (JSON-serialized) form stored in the index.
/// Results are ordered by descending similarity to the query embedding; ties
/// fall back to index-internal order, which is stable for a fixed index state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: String,
}

/// JSON body of `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Response produced once per query.
///
/// `sources` is `None` exactly when the question was rejected by the
/// prompt-injection screen; an empty `Some(vec![])` means retrieval ran and
/// found nothing.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Option<Vec<RetrievedChunk>>,
    pub tokens_used: Option<u64>,
    pub latency_ms: Option<f64>,
}

/// Structured result of one generation call.
///
/// The generation gateway always returns this record, never a bare string,
/// so callers never have to unwrap nested answer shapes. `degraded` is true
/// when `answer` is a fallback produced because the backend call failed.
#[derive(Debug, Clone)]
pub struct Completion {
    pub answer: String,
    pub tokens_used: Option<u64>,
    pub latency_ms: f64,
    pub degraded: bool,
}

/// Per-batch ingestion outcome.
///
/// `failed` counts chunks that could not be embedded or inserted; partial
/// ingestion is surfaced to the caller rather than silently swallowed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub failed: usize,
}
