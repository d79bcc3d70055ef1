//! Process-wide pipeline components.
//!
//! The embedding model and the vector store are expensive to set up and are
//! shared by every ingestion and query in the process. [`Services::init`]
//! creates them once; [`Services::shutdown`] closes the store so SQLite can
//! checkpoint its WAL. Both the CLI commands and the HTTP server go through
//! this type.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::extract::Extractor;
use crate::store::{open_store, VectorStore};

pub struct Services {
    pub config: Config,
    pub extractor: Arc<Extractor>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
}

impl Services {
    /// Load the embedding model and open the store named by `config`.
    pub async fn init(config: Config) -> Result<Self> {
        let embedding_config = config.embedding.clone();
        // Local models load synchronously and can take seconds.
        let embedder = tokio::task::spawn_blocking(move || create_provider(&embedding_config)).await??;
        info!(
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            dims = embedder.dims(),
            "embedding provider ready"
        );

        let store = open_store(&config).await?;

        Ok(Self {
            extractor: Arc::new(Extractor::from_config(&config)),
            embedder: Arc::from(embedder),
            store: Arc::from(store),
            config,
        })
    }

    /// Assemble services from already-built parts.
    pub fn with_components(
        config: Config,
        extractor: Extractor,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            extractor: Arc::new(extractor),
            embedder,
            store,
        }
    }

    /// Flush and close the store.
    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await?;
        info!(collection = self.store.collection(), "vector store closed");
        Ok(())
    }
}
