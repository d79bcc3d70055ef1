//! SQLite-backed [`VectorStore`].
//!
//! Records are rows in the `records` table keyed by `(collection, id)`,
//! with the embedding as a little-endian f32 BLOB. Upserts run in one
//! transaction. Queries are exact: every vector in the collection is
//! scored by cosine distance.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::migrate;
use crate::models::{Neighbor, RecordMetadata, StoredRecord};

use super::memory::{check_dims, check_query_dims};
use super::{rank, VectorStore, DISTANCE_METRIC};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    /// Open the database at `path`, create the schema, and get-or-create
    /// `collection`.
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Self::with_pool(pool, collection).await
    }

    /// Use an already-migrated pool.
    pub async fn with_pool(pool: SqlitePool, collection: &str) -> Result<Self> {
        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, distance, created_at) VALUES (?, ?, ?)",
        )
        .bind(collection)
        .bind(DISTANCE_METRIC)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&pool)
        .await?;

        let distance: String =
            sqlx::query_scalar("SELECT distance FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_one(&pool)
                .await?;
        if distance != DISTANCE_METRIC {
            bail!(
                "collection '{}' uses {} distance, expected {}",
                collection,
                distance,
                DISTANCE_METRIC
            );
        }

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn stored_dims(&self) -> Result<Option<usize>> {
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM records WHERE collection = ? LIMIT 1")
                .bind(&self.collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(dims.map(|d| d as usize))
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, records: &[StoredRecord]) -> Result<()> {
        check_dims(self.stored_dims().await?, records)?;

        let mut tx = self.pool.begin().await?;
        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document_id, chunk_index, document,
                                     metadata_json, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&record.metadata.document_id)
            .bind(record.metadata.chunk_index as i64)
            .bind(&record.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.embedding))
            .bind(record.embedding.len() as i64)
            .bind(&record.metadata.timestamp)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert record {}", record.id))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        check_query_dims(self.stored_dims().await?, embedding)?;

        let rows = sqlx::query("SELECT id, metadata_json, embedding FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;

        let mut neighbors = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            let metadata: RecordMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for record {}", id))?;
            neighbors.push(Neighbor {
                distance: cosine_distance(embedding, &blob_to_vec(&blob)),
                id,
                metadata,
            });
        }
        Ok(rank(neighbors, limit))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn document_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT document_id) FROM records WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
