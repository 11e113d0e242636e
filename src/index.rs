//! Vector index gateway.
//!
//! Translates chunks and queries into vector operations against a Qdrant
//! instance over its REST API. The gateway owns the embedding step: callers
//! hand it plain text and get back plain text.
//!
//! Retrieval is deliberately failure-tolerant: an unreachable index degrades
//! a query to zero context rather than failing the whole request. Collection
//! creation is the exception — a pipeline must not start against a
//! half-initialized index, so [`VectorIndex::ensure_collection`] errors are
//! fatal at startup.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::embedding::Embedder;
use crate::models::{DocumentChunk, IngestReport, RetrievedChunk};

/// Nearest-neighbor index over document chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently create the collection with a `text` and `metadata`
    /// payload and the embedder's dimensionality. Never alters an existing
    /// collection's schema.
    async fn ensure_collection(&self) -> Result<()>;

    /// Embed and insert chunks as new records. No deduplication: re-ingesting
    /// identical text creates duplicates. Per-chunk failures are logged and
    /// counted, never silently dropped.
    async fn upsert(&self, chunks: &[DocumentChunk]) -> IngestReport;

    /// Embed the query and return the `top_k` nearest chunks by similarity.
    /// Returns an empty vector, never an error, when the index or the
    /// embedding backend is unreachable.
    async fn search(&self, query_text: &str, top_k: usize) -> Vec<RetrievedChunk>;
}

/// Qdrant-backed implementation of [`VectorIndex`].
pub struct QdrantIndex {
    base_url: String,
    collection: String,
    client: reqwest::Client,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    pub fn new(config: &IndexConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            client,
            embedder,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embedder.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<()> {
        let resp = self.client.get(self.collection_url()).send().await?;

        if resp.status().is_success() {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        if resp.status().as_u16() != 404 {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Vector index returned {} for collection probe: {}", status, body);
        }

        let schema = serde_json::json!({
            "vectors": {
                "size": self.embedder.dims(),
                "distance": "Cosine",
            }
        });

        let resp = self
            .client
            .put(self.collection_url())
            .json(&schema)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Failed to create collection (HTTP {}): {}", status, body);
        }

        debug!(collection = %self.collection, dims = self.embedder.dims(), "collection created");
        Ok(())
    }

    async fn upsert(&self, chunks: &[DocumentChunk]) -> IngestReport {
        let mut points = Vec::with_capacity(chunks.len());
        let mut failed = 0usize;

        for chunk in chunks {
            let vector = match self.embed_one(&chunk.text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "failed to embed chunk, skipping");
                    failed += 1;
                    continue;
                }
            };

            let metadata = serde_json::to_string(&chunk.metadata).unwrap_or_default();
            points.push(serde_json::json!({
                "id": Uuid::new_v4().to_string(),
                "vector": vector,
                "payload": {
                    "text": chunk.text,
                    "metadata": metadata,
                }
            }));
        }

        if points.is_empty() {
            return IngestReport { added: 0, failed };
        }

        let added = points.len();
        let body = serde_json::json!({ "points": points });

        let resp = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) if response.status().is_success() => IngestReport { added, failed },
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(%status, body = %body.chars().take(500).collect::<String>(), "point upsert rejected");
                IngestReport {
                    added: 0,
                    failed: failed + added,
                }
            }
            Err(e) => {
                warn!(error = %e, "vector index unreachable during upsert");
                IngestReport {
                    added: 0,
                    failed: failed + added,
                }
            }
        }
    }

    async fn search(&self, query_text: &str, top_k: usize) -> Vec<RetrievedChunk> {
        let vector = match self.embed_one(query_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, returning no context");
                return Vec::new();
            }
        };

        let body = serde_json::json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });

        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await;

        let json: serde_json::Value = match resp {
            Ok(response) if response.status().is_success() => {
                match response.json().await {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(error = %e, "malformed search response");
                        return Vec::new();
                    }
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "vector search rejected");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "vector index unreachable during search");
                return Vec::new();
            }
        };

        parse_search_response(&json)
    }
}

/// Project a Qdrant search response onto `{text, metadata}`, preserving the
/// service's similarity ordering.
fn parse_search_response(json: &serde_json::Value) -> Vec<RetrievedChunk> {
    let hits = match json.get("result").and_then(|r| r.as_array()) {
        Some(hits) => hits,
        None => return Vec::new(),
    };

    hits.iter()
        .filter_map(|hit| {
            let payload = hit.get("payload")?;
            Some(RetrievedChunk {
                text: payload.get("text")?.as_str()?.to_string(),
                metadata: payload
                    .get("metadata")
                    .and_then(|m| m.as_str())
                    .unwrap_or("")
                    .to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_hits_in_order() {
        let json = serde_json::json!({
            "result": [
                { "score": 0.9, "payload": { "text": "first", "metadata": "{\"filename\":\"a\"}" } },
                { "score": 0.7, "payload": { "text": "second", "metadata": "" } }
            ]
        });
        let chunks = parse_search_response(&json);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "first");
        assert_eq!(chunks[1].text, "second");
    }

    #[test]
    fn hits_without_payload_text_are_skipped() {
        let json = serde_json::json!({
            "result": [ { "score": 0.5, "payload": {} } ]
        });
        assert!(parse_search_response(&json).is_empty());
    }

    #[test]
    fn missing_result_array_yields_empty() {
        let json = serde_json::json!({ "status": "error" });
        assert!(parse_search_response(&json).is_empty());
    }
}
