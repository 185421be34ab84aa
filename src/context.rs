//! Explicit application context.
//!
//! One value holds every collaborator the pipeline and retriever need. It
//! is cheap to clone: stateful handles sit behind `Arc`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use docqa_core::chunk::Chunker;
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::store::{DistanceMetric, HybridWeights, VectorStore};
use docqa_core::validate::Validator;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::extract::TextExtractor;
use crate::pg_store::PgVectorStore;

/// Retrieval tuning taken from `[search]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchSettings {
    pub method: DistanceMetric,
    pub weights: HybridWeights,
}

#[derive(Clone)]
pub struct AppContext {
    pub validator: Validator,
    pub blobs: BlobStore,
    pub extractor: TextExtractor,
    pub chunker: Chunker,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub search: SearchSettings,
}

impl AppContext {
    /// Context with default validation, chunking and search settings.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        blob_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            validator: Validator::default(),
            blobs: BlobStore::new(blob_dir),
            extractor: TextExtractor::new(),
            chunker: Chunker::default(),
            embedder,
            store,
            search: SearchSettings::default(),
        }
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_search(mut self, search: SearchSettings) -> Self {
        self.search = search;
        self
    }

    /// Context wired from configuration around the given backends.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(store, embedder, config.blob.dir.clone())
            .with_validator(Validator::new(config.blob.max_bytes))
            .with_chunker(Chunker::new(
                config.chunk.max_tokens,
                config.chunk.overlap_words,
            ))
            .with_search(SearchSettings {
                method: config.search.method,
                weights: config.search.hybrid_weights,
            })
    }

    /// Connect to Postgres and build the embedding provider.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn VectorStore> = Arc::new(PgVectorStore::new(pool));
        let embedder = create_provider(&config.embedding)?;
        Ok(Self::from_config(config, store, embedder))
    }
}
