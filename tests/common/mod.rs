//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use docqa::context::AppContext;
use docqa::embedding::DisabledProvider;
use docqa::models::{Document, DocumentChunk, DocumentStatus, ScoredChunk};
use docqa::store::memory::InMemoryStore;
use docqa::store::{DistanceMetric, HybridWeights, VectorStore};
use docqa_core::embedding::EmbeddingProvider;

/// Embeds text as counts over a fixed vocabulary plus a constant bias
/// component, so no vector is ever zero.
pub struct WordAxisEmbedder {
    vocab: Vec<&'static str>,
}

impl WordAxisEmbedder {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self {
            vocab: vocab.to_vec(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for WordAxisEmbedder {
    fn model_name(&self) -> &str {
        "word-axis"
    }

    fn dims(&self) -> usize {
        self.vocab.len() + 1
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut v: Vec<f32> = self
            .vocab
            .iter()
            .map(|term| words.iter().filter(|w| *w == term).count() as f32)
            .collect();
        v.push(0.1);
        Some(v)
    }
}

/// Wraps another provider and sleeps before embedding any text that
/// contains `marker`.
pub struct DelayedEmbedder<E> {
    inner: E,
    marker: &'static str,
    delay: Duration,
}

impl<E> DelayedEmbedder<E> {
    pub fn new(inner: E, marker: &'static str, delay: Duration) -> Self {
        Self {
            inner,
            marker,
            delay,
        }
    }
}

#[async_trait]
impl<E: EmbeddingProvider> EmbeddingProvider for DelayedEmbedder<E> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if text.contains(self.marker) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.embed(text).await
    }
}

/// An [`InMemoryStore`] that can be told to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    /// 1-based `save_chunk` call that errors.
    fail_save_chunk_at: Option<usize>,
    fail_vector_ops: bool,
    save_chunk_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_save_chunk_at(n: usize) -> Self {
        Self {
            fail_save_chunk_at: Some(n),
            ..Self::default()
        }
    }

    pub fn failing_vector_ops() -> Self {
        Self {
            fail_vector_ops: true,
            ..Self::default()
        }
    }

    fn check_vector_ops(&self) -> Result<()> {
        if self.fail_vector_ops {
            bail!("vector index unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        self.inner.save_document(doc).await
    }

    async fn update_document(&self, doc: &Document) -> Result<()> {
        self.inner.update_document(doc).await
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<Document>> {
        self.inner.find_document(id).await
    }

    async fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>> {
        self.inner.list_documents(status).await
    }

    async fn search_documents(&self, keyword: &str, limit: i64) -> Result<Vec<Document>> {
        self.inner.search_documents(keyword, limit).await
    }

    async fn save_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
        let call = self.save_chunk_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_save_chunk_at == Some(call) {
            bail!("connection reset while saving chunk {}", chunk.chunk_index);
        }
        self.inner.save_chunk(chunk).await
    }

    async fn find_chunks_by_document(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        self.inner.find_chunks_by_document(document_id).await
    }

    async fn count_chunks(&self, document_id: Uuid) -> Result<i64> {
        self.inner.count_chunks(document_id).await
    }

    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: i64,
        metric: DistanceMetric,
    ) -> Result<Vec<DocumentChunk>> {
        self.check_vector_ops()?;
        self.inner.nearest_chunks(query, k, metric).await
    }

    async fn hybrid_search(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<DocumentChunk>> {
        self.check_vector_ops()?;
        self.inner.hybrid_search(query, keyword, k, weights).await
    }

    async fn hybrid_search_with_scores(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<ScoredChunk>> {
        self.check_vector_ops()?;
        self.inner
            .hybrid_search_with_scores(query, keyword, k, weights)
            .await
    }

    async fn text_contains(&self, keyword: &str, k: i64) -> Result<Vec<DocumentChunk>> {
        self.inner.text_contains(keyword, k).await
    }

    async fn delete_chunks_by_document(&self, document_id: Uuid) -> Result<u64> {
        self.inner.delete_chunks_by_document(document_id).await
    }
}

pub fn disabled_context(store: Arc<dyn VectorStore>, blob_dir: &Path) -> AppContext {
    AppContext::new(store, Arc::new(DisabledProvider::new(4)), blob_dir)
}

/// A COMPLETED document with the given chunks, embedded by `embedder`.
pub async fn seed_completed(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    filename: &str,
    chunks: &[(i32, &str)],
) -> Document {
    let mut doc = Document::new_processing(filename, "text/plain", 1, format!("/blobs/{filename}"));
    store.save_document(&doc).await.unwrap();
    for (index, text) in chunks {
        let embedding = embedder.embed(text).await;
        store
            .save_chunk(&DocumentChunk::new(doc.id, *index, *text, embedding, 1))
            .await
            .unwrap();
    }
    doc.transition_to(DocumentStatus::Completed).unwrap();
    store.update_document(&doc).await.unwrap();
    doc
}

/// Single-page PDF that draws `phrase` in Helvetica.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({phrase}) Tj ET\n");
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    offsets.push(out.len());
    write!(
        out,
        "4 0 obj << /Length {} >> stream\n{}endstream endobj\n",
        content.len(),
        content
    )
    .unwrap();
    offsets.push(out.len());
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    write!(out, "{:010} 65535 f \n", 0).unwrap();
    for offset in offsets {
        write!(out, "{:010} 00000 n \n", offset).unwrap();
    }
    write!(
        out,
        "trailer << /Size 6 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        xref_start
    )
    .unwrap();
    out
}
