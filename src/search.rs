//! Query-time retrieval.
//!
//! Every entry point embeds the query first. When that yields nothing the
//! retriever goes straight to substring search; when the vector path
//! errors it logs and falls back to the same substring search, tagging the
//! results so callers can tell the two apart.

use anyhow::Result;
use tracing::{debug, info, warn};

use docqa_core::models::{DocumentChunk, SearchMethod, SearchResult};

use crate::context::AppContext;

pub struct Retriever {
    ctx: AppContext,
}

impl Retriever {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Ranked chunks for `query`, at most `k` (clamped to at least 1).
    ///
    /// Only errors if the substring fallback itself fails.
    pub async fn search(&self, query: &str, k: i64) -> Result<Vec<SearchResult>> {
        let k = k.max(1);

        let Some(qe) = self.ctx.embedder.embed(query).await else {
            return self.fallback(query, k, SearchMethod::TextSearch).await;
        };

        match self
            .ctx
            .store
            .hybrid_search_with_scores(&qe, query, k, self.ctx.search.weights)
            .await
        {
            Ok(rows) => {
                for row in &rows {
                    debug!(
                        chunk_id = %row.chunk.id,
                        vector_similarity = row.vector_similarity,
                        text_rank = row.text_rank,
                        hybrid_score = row.hybrid_score,
                        "hybrid hit"
                    );
                }
                info!(results = rows.len(), method = "hybrid_search", "search complete");
                Ok(rows.into_iter().map(SearchResult::hybrid).collect())
            }
            Err(e) => {
                warn!(error = %e, "hybrid search failed, falling back to text search");
                self.fallback(query, k, SearchMethod::TextSearchFallback).await
            }
        }
    }

    /// Nearest embedded chunks under the configured distance metric.
    pub async fn search_chunks(&self, query: &str, k: i64) -> Result<Vec<DocumentChunk>> {
        let k = k.max(1);
        let Some(qe) = self.ctx.embedder.embed(query).await else {
            return self.ctx.store.text_contains(query, k).await;
        };
        match self
            .ctx
            .store
            .nearest_chunks(&qe, k, self.ctx.search.method)
            .await
        {
            Ok(chunks) => Ok(chunks),
            Err(e) => {
                warn!(
                    error = %e,
                    metric = self.ctx.search.method.as_str(),
                    "vector search failed, falling back to text search"
                );
                self.ctx.store.text_contains(query, k).await
            }
        }
    }

    /// Embedded chunks matching `query` lexically, by composite score,
    /// without the component scores.
    pub async fn search_hybrid(&self, query: &str, k: i64) -> Result<Vec<DocumentChunk>> {
        let k = k.max(1);
        let Some(qe) = self.ctx.embedder.embed(query).await else {
            return self.ctx.store.text_contains(query, k).await;
        };
        match self
            .ctx
            .store
            .hybrid_search(&qe, query, k, self.ctx.search.weights)
            .await
        {
            Ok(chunks) => Ok(chunks),
            Err(e) => {
                warn!(error = %e, "hybrid search failed, falling back to text search");
                self.ctx.store.text_contains(query, k).await
            }
        }
    }

    async fn fallback(
        &self,
        query: &str,
        k: i64,
        method: SearchMethod,
    ) -> Result<Vec<SearchResult>> {
        let chunks = self.ctx.store.text_contains(query, k).await?;
        info!(results = chunks.len(), method = method.as_str(), "search complete");
        Ok(chunks
            .into_iter()
            .map(|mut c| {
                c.embedding = None;
                SearchResult::unscored(c, method)
            })
            .collect())
    }
}
