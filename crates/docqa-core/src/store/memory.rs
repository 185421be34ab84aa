//! In-memory [`VectorStore`] implementation for tests and embedded use.
//!
//! Documents and chunks live behind a single `std::sync::RwLock`, so a
//! foreign-key or uniqueness check and the insert it guards are atomic.
//! Vector search is brute force over every stored embedding.
//!
//! Full-text matching approximates Postgres' `english` configuration:
//! text is split into lowercase alphanumeric lexemes, common stop words are
//! dropped, and a plural `s` is stripped. A query matches when every one of
//! its lexemes occurs in the content, and its rank grows with how often
//! they occur. Scores are not numerically identical to `ts_rank`, but they
//! order chunks the same way for the cases the pipeline relies on.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::embedding::{cosine_distance, l2_distance};
use crate::models::{Document, DocumentChunk, DocumentStatus, ScoredChunk};

use super::{DistanceMetric, HybridWeights, VectorStore};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

#[derive(Default)]
struct Inner {
    docs: HashMap<Uuid, Document>,
    chunks: Vec<DocumentChunk>,
}

impl Inner {
    fn is_completed(&self, document_id: Uuid) -> bool {
        self.docs
            .get(&document_id)
            .map(|d| d.status == DocumentStatus::Completed)
            .unwrap_or(false)
    }

    fn completed_chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.chunks
            .iter()
            .filter(move |c| self.is_completed(c.document_id))
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn limit(k: i64) -> usize {
    k.max(0) as usize
}

fn lexemes(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w
            }
        })
        .collect()
}

/// Rank of `content` for `query`, or `None` when the query does not match.
fn text_rank(query: &str, content: &str) -> Option<f64> {
    let query_terms = lexemes(query);
    if query_terms.is_empty() {
        return None;
    }
    let doc_terms = lexemes(content);
    let mut rank = 0.0;
    for term in &query_terms {
        let freq = doc_terms.iter().filter(|t| *t == term).count();
        if freq == 0 {
            return None;
        }
        let f = freq as f64;
        rank += 0.1 * f / (f + 1.0);
    }
    Some(rank)
}

fn contains_ci(content: &str, keyword: &str) -> bool {
    content.to_lowercase().contains(&keyword.to_lowercase())
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// pgvector refuses to compare vectors of different lengths; so do we.
fn same_dims(emb: &[f32], query: &[f32]) -> Result<()> {
    if emb.len() != query.len() {
        bail!(
            "different vector dimensions {} and {}",
            emb.len(),
            query.len()
        );
    }
    Ok(())
}

fn without_embedding(c: &DocumentChunk) -> DocumentChunk {
    DocumentChunk {
        embedding: None,
        ..c.clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        let mut inner = self.write()?;
        inner.docs.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn update_document(&self, doc: &Document) -> Result<()> {
        let mut inner = self.write()?;
        let mut stored = doc.clone();
        stored.updated_at = Utc::now();
        inner.docs.insert(doc.id, stored);
        Ok(())
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(&id).cloned())
    }

    async fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>> {
        let inner = self.read()?;
        let mut docs: Vec<Document> = inner
            .docs
            .values()
            .filter(|d| status.map(|s| d.status == s).unwrap_or(true))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn search_documents(&self, keyword: &str, k: i64) -> Result<Vec<Document>> {
        let inner = self.read()?;
        let mut docs: Vec<Document> = inner
            .docs
            .values()
            .filter(|d| d.status == DocumentStatus::Completed)
            .filter(|d| {
                inner
                    .chunks
                    .iter()
                    .any(|c| c.document_id == d.id && contains_ci(&c.content, keyword))
            })
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs.truncate(limit(k));
        Ok(docs)
    }

    async fn save_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.docs.contains_key(&chunk.document_id) {
            bail!(
                "chunk {} references unknown document {}",
                chunk.id,
                chunk.document_id
            );
        }
        if inner
            .chunks
            .iter()
            .any(|c| c.document_id == chunk.document_id && c.chunk_index == chunk.chunk_index)
        {
            bail!(
                "duplicate chunk index {} for document {}",
                chunk.chunk_index,
                chunk.document_id
            );
        }
        inner.chunks.push(chunk.clone());
        Ok(())
    }

    async fn find_chunks_by_document(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        let inner = self.read()?;
        let mut chunks: Vec<DocumentChunk> = inner
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn count_chunks(&self, document_id: Uuid) -> Result<i64> {
        let inner = self.read()?;
        Ok(inner
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .count() as i64)
    }

    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: i64,
        metric: DistanceMetric,
    ) -> Result<Vec<DocumentChunk>> {
        let inner = self.read()?;
        let mut scored = Vec::new();
        for c in inner.completed_chunks() {
            let Some(emb) = c.embedding.as_deref() else {
                continue;
            };
            same_dims(emb, query)?;
            let distance = match metric {
                DistanceMetric::Cosine => cosine_distance(emb, query),
                DistanceMetric::L2 => l2_distance(emb, query),
            };
            scored.push((distance, c));
        }
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(limit(k))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn hybrid_search(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<DocumentChunk>> {
        let inner = self.read()?;
        let mut scored = Vec::new();
        for c in inner.completed_chunks() {
            let Some(emb) = c.embedding.as_deref() else {
                continue;
            };
            let rank = text_rank(keyword, &c.content);
            if rank.is_none() && !contains_ci(&c.content, keyword) {
                continue;
            }
            same_dims(emb, query)?;
            let similarity = 1.0 - cosine_distance(emb, query);
            scored.push((weights.combine(Some(similarity), rank.unwrap_or(0.0)), c));
        }
        scored.sort_by(|a, b| by_score_desc(a.0, b.0));
        Ok(scored
            .into_iter()
            .take(limit(k))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn hybrid_search_with_scores(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<ScoredChunk>> {
        let inner = self.read()?;
        let mut scored = Vec::new();
        for c in inner.completed_chunks() {
            let rank = text_rank(keyword, &c.content);
            let admitted =
                c.embedding.is_some() || rank.is_some() || contains_ci(&c.content, keyword);
            if !admitted {
                continue;
            }
            let similarity = match c.embedding.as_deref() {
                Some(emb) => {
                    same_dims(emb, query)?;
                    Some(1.0 - cosine_distance(emb, query))
                }
                None => None,
            };
            let text_rank = rank.unwrap_or(0.0);
            scored.push(ScoredChunk {
                chunk: without_embedding(c),
                vector_similarity: similarity.unwrap_or(0.0),
                text_rank,
                hybrid_score: weights.combine(similarity, text_rank),
            });
        }
        scored.sort_by(|a, b| by_score_desc(a.hybrid_score, b.hybrid_score));
        scored.truncate(limit(k));
        Ok(scored)
    }

    async fn text_contains(&self, keyword: &str, k: i64) -> Result<Vec<DocumentChunk>> {
        let inner = self.read()?;
        let mut chunks: Vec<DocumentChunk> = inner
            .completed_chunks()
            .filter(|c| contains_ci(&c.content, keyword))
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks.truncate(limit(k));
        Ok(chunks)
    }

    async fn delete_chunks_by_document(&self, document_id: Uuid) -> Result<u64> {
        let mut inner = self.write()?;
        let before = inner.chunks.len();
        inner.chunks.retain(|c| c.document_id != document_id);
        Ok((before - inner.chunks.len()) as u64)
    }
}
