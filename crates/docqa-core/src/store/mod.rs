//! Storage abstraction for docqa.
//!
//! The [`VectorStore`] trait defines every persistence and retrieval
//! operation the ingestion pipeline and retriever need, so the Postgres
//! backend and the in-memory backend are interchangeable.
//!
//! Retrieval queries (`nearest_chunks`, `hybrid_search*`, `text_contains`,
//! `search_documents`) only ever see chunks of documents whose status is
//! `COMPLETED`. Direct lookups by id do not filter on status.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Document, DocumentChunk, DocumentStatus, ScoredChunk};

/// Weights of the hybrid composite score.
///
/// `score = vector * (1 - cosine_distance) + text * ts_rank` for chunks that
/// have an embedding. A chunk without one scores its text rank alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    #[serde(default = "default_vector_weight")]
    pub vector: f64,
    #[serde(default = "default_text_weight")]
    pub text: f64,
}

fn default_vector_weight() -> f64 {
    0.7
}

fn default_text_weight() -> f64 {
    0.3
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: default_vector_weight(),
            text: default_text_weight(),
        }
    }
}

impl HybridWeights {
    /// Composite score for one chunk. `vector_similarity` is `None` when the
    /// chunk has no embedding.
    pub fn combine(&self, vector_similarity: Option<f64>, text_rank: f64) -> f64 {
        match vector_similarity {
            Some(sim) => self.vector * sim + self.text * text_rank,
            None => text_rank,
        }
    }
}

/// Distance operator used by pure vector kNN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
        }
    }
}

/// Abstract storage backend for docqa.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_document`](VectorStore::save_document) | Insert or replace a document by id |
/// | [`update_document`](VectorStore::update_document) | Persist a status change; stamps `updated_at` |
/// | [`find_document`](VectorStore::find_document) | Lookup by id |
/// | [`list_documents`](VectorStore::list_documents) | All documents, or one status, newest first |
/// | [`search_documents`](VectorStore::search_documents) | Completed documents with a chunk containing a keyword |
/// | [`save_chunk`](VectorStore::save_chunk) | Insert one chunk |
/// | [`find_chunks_by_document`](VectorStore::find_chunks_by_document) | A document's chunks by index |
/// | [`count_chunks`](VectorStore::count_chunks) | Number of chunks of a document |
/// | [`nearest_chunks`](VectorStore::nearest_chunks) | Vector kNN under a metric |
/// | [`hybrid_search`](VectorStore::hybrid_search) | Vector + text composite, embedded chunks only |
/// | [`hybrid_search_with_scores`](VectorStore::hybrid_search_with_scores) | Composite with component scores |
/// | [`text_contains`](VectorStore::text_contains) | Case-insensitive substring fallback |
/// | [`delete_chunks_by_document`](VectorStore::delete_chunks_by_document) | Remove a document's chunks |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert the document, or replace every column of an existing row with
    /// the same id.
    async fn save_document(&self, doc: &Document) -> Result<()>;

    /// Persist status and metadata changes. The store sets `updated_at`.
    async fn update_document(&self, doc: &Document) -> Result<()>;

    async fn find_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// Newest first.
    async fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>>;

    /// Distinct `COMPLETED` documents with at least one chunk containing
    /// `keyword` case-insensitively, newest first.
    async fn search_documents(&self, keyword: &str, limit: i64) -> Result<Vec<Document>>;

    /// Insert a chunk. Fails if the document does not exist or if a chunk
    /// with the same `(document_id, chunk_index)` is already stored.
    async fn save_chunk(&self, chunk: &DocumentChunk) -> Result<()>;

    /// Ordered by `chunk_index` ascending.
    async fn find_chunks_by_document(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>>;

    async fn count_chunks(&self, document_id: Uuid) -> Result<i64>;

    /// The `k` embedded chunks nearest to `query`, nearest first.
    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: i64,
        metric: DistanceMetric,
    ) -> Result<Vec<DocumentChunk>>;

    async fn knn_cosine(&self, query: &[f32], k: i64) -> Result<Vec<DocumentChunk>> {
        self.nearest_chunks(query, k, DistanceMetric::Cosine).await
    }

    async fn knn_l2(&self, query: &[f32], k: i64) -> Result<Vec<DocumentChunk>> {
        self.nearest_chunks(query, k, DistanceMetric::L2).await
    }

    /// Embedded chunks that contain `keyword` as a case-insensitive substring
    /// or match it under english full-text search, best composite first.
    async fn hybrid_search(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<DocumentChunk>>;

    /// Like [`hybrid_search`](VectorStore::hybrid_search) but also admits
    /// every embedded chunk, and chunks without an embedding that match the
    /// keyword, and returns the component scores.
    async fn hybrid_search_with_scores(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<ScoredChunk>>;

    /// Chunks containing `keyword` case-insensitively, by `chunk_index`.
    async fn text_contains(&self, keyword: &str, k: i64) -> Result<Vec<DocumentChunk>>;

    /// Returns the number of chunks removed.
    async fn delete_chunks_by_document(&self, document_id: Uuid) -> Result<u64>;
}
