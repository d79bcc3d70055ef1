//! In-memory [`VectorStore`] for tests and the `memory` backend.
//!
//! Records live in a `HashMap` keyed by id behind `std::sync::RwLock`.
//! Queries are brute-force cosine distance over every stored vector.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{Neighbor, StoredRecord};

use super::{rank, VectorStore};

pub struct InMemoryStore {
    collection: String,
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            records: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// Reject a batch whose vectors differ in dimension from `existing` (the
/// collection's current dimension) or from each other.
pub(crate) fn check_dims(existing: Option<usize>, batch: &[StoredRecord]) -> Result<()> {
    let expected = existing.or_else(|| batch.first().map(|r| r.embedding.len()));
    if let Some(expected) = expected {
        if let Some(bad) = batch.iter().find(|r| r.embedding.len() != expected) {
            bail!(
                "embedding dimension mismatch for {}: collection holds {}-d vectors, got {}",
                bad.id,
                expected,
                bad.embedding.len()
            );
        }
    }
    Ok(())
}

/// Reject a query vector whose dimension differs from the collection's.
pub(crate) fn check_query_dims(existing: Option<usize>, query: &[f32]) -> Result<()> {
    match existing {
        Some(expected) if expected != query.len() => bail!(
            "query dimension mismatch: collection holds {}-d vectors, got {}",
            expected,
            query.len()
        ),
        _ => Ok(()),
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, records: &[StoredRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(poisoned)?;
        let existing = stored.values().next().map(|r| r.embedding.len());
        check_dims(existing, records)?;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        let stored = self.records.read().map_err(poisoned)?;
        check_query_dims(stored.values().next().map(|r| r.embedding.len()), embedding)?;
        let neighbors = stored
            .values()
            .map(|r| Neighbor {
                id: r.id.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(embedding, &r.embedding),
            })
            .collect();
        Ok(rank(neighbors, limit))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    async fn document_count(&self) -> Result<usize> {
        let stored = self.records.read().map_err(poisoned)?;
        let docs: HashSet<&str> = stored
            .values()
            .map(|r| r.metadata.document_id.as_str())
            .collect();
        Ok(docs.len())
    }
}
