//! Storage layer: the vector store abstraction and the record identity scheme.
//!
//! The [`VectorStore`] trait is the persistence contract: batch upsert by
//! string id, exact cosine nearest-neighbor query, and a record count.
//! Backends:
//!
//! | Backend | Type | Lifetime |
//! |---------|------|----------|
//! | `sqlite` | [`SqliteStore`] | persistent, one file per store |
//! | `memory` | [`InMemoryStore`] | process lifetime |
//!
//! On top of it, [`store_document`] turns a document's chunks and vectors
//! into [`StoredRecord`]s with ids `"{document_id}_chunk_{i}"`, which makes
//! re-storing the same document id overwrite rather than duplicate, and
//! [`query_similar`] embeds a query and returns the closest chunks.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::IngestError;
use crate::models::{Neighbor, QueryMatch, RecordMetadata, StoredRecord};

/// Distance metric every collection is created with.
pub const DISTANCE_METRIC: &str = "cosine";

/// Key-value plus nearest-neighbor store for chunk records.
///
/// Implementations must be safe for concurrent `upsert` and `query` calls.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection this handle reads and writes.
    fn collection(&self) -> &str;

    /// Insert records, overwriting any record that shares an id.
    ///
    /// Fails if the vector dimension differs from vectors already stored.
    async fn upsert(&self, records: &[StoredRecord]) -> Result<()>;

    /// The `limit` records closest to `embedding` by cosine distance, closest first.
    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<Neighbor>>;

    /// Total number of records in the collection.
    async fn count(&self) -> Result<usize>;

    /// Number of distinct document ids in the collection.
    async fn document_count(&self) -> Result<usize>;

    /// Flush and release resources. The handle must not be used afterwards.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the store backend named in the configuration.
pub async fn open_store(config: &Config) -> Result<Box<dyn VectorStore>> {
    let store: Box<dyn VectorStore> = match config.store.backend.as_str() {
        "memory" => Box::new(InMemoryStore::new(&config.store.collection)),
        _ => Box::new(SqliteStore::open(&config.store.path, &config.store.collection).await?),
    };
    info!(
        backend = %config.store.backend,
        collection = store.collection(),
        records = store.count().await?,
        "vector store ready"
    );
    Ok(store)
}

/// Stable record id for chunk `index` of `document_id`.
pub fn record_id(document_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", document_id, index)
}

/// Pair chunks with their vectors, stamping every record with `timestamp`.
pub fn build_records(
    document_id: &str,
    chunks: &[String],
    embeddings: &[Vec<f32>],
    timestamp: &str,
) -> Vec<StoredRecord> {
    chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (text, embedding))| StoredRecord {
            id: record_id(document_id, i),
            embedding: embedding.clone(),
            text: text.clone(),
            metadata: RecordMetadata {
                document_id: document_id.to_string(),
                chunk_text: text.clone(),
                chunk_index: i,
                timestamp: timestamp.to_string(),
            },
        })
        .collect()
}

/// Persist a document's chunks as one batch. Returns the number of records written.
///
/// Empty `chunks` is a no-op. All records of one call share a single
/// ISO-8601 timestamp.
pub async fn store_document(
    store: &dyn VectorStore,
    document_id: &str,
    chunks: &[String],
    embeddings: &[Vec<f32>],
) -> Result<usize, IngestError> {
    if chunks.len() != embeddings.len() {
        return Err(IngestError::LengthMismatch {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }
    if chunks.is_empty() {
        return Ok(0);
    }

    let timestamp = chrono::Utc::now().to_rfc3339();
    let records = build_records(document_id, chunks, embeddings, &timestamp);
    store.upsert(&records).await.map_err(IngestError::Storage)?;

    let total = store.count().await.map_err(IngestError::Storage)?;
    info!(
        document_id,
        stored = records.len(),
        collection = store.collection(),
        total,
        "stored chunks"
    );
    Ok(records.len())
}

/// The `top_k` stored chunks most similar to `text`, best first.
///
/// `top_k` is capped at the store's record count; an empty store returns
/// no matches without calling the embedder.
pub async fn query_similar(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    text: &str,
    top_k: usize,
) -> Result<Vec<QueryMatch>, IngestError> {
    let available = store.count().await.map_err(IngestError::Storage)?;
    let limit = top_k.min(available);
    if limit == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(embedder, text)
        .await
        .map_err(IngestError::Embedding)?;
    let neighbors = store
        .query(&query_vec, limit)
        .await
        .map_err(IngestError::Storage)?;

    Ok(neighbors.into_iter().map(QueryMatch::from).collect())
}

/// Sort neighbors closest first, breaking ties by id, and keep `limit`.
pub(crate) fn rank(mut neighbors: Vec<Neighbor>, limit: usize) -> Vec<Neighbor> {
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    neighbors.truncate(limit);
    neighbors
}
