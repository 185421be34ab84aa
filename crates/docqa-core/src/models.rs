//! Core data models used throughout docqa.
//!
//! These types represent the uploads, documents, chunks, and search results
//! that flow through the ingestion and retrieval pipeline. A chunk refers to
//! its document by id only; the chunks of a document are a store query, not
//! an owned list.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw upload as handed to the pipeline by a transport.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original filename supplied by the client, if any.
    pub filename: Option<String>,
    /// Declared MIME type, if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Processing state of a [`Document`].
///
/// `Processing` is the only non-terminal state. Transitions go to exactly
/// one of `Completed` or `Failed` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DocumentStatus::Processing)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "COMPLETED" => Ok(DocumentStatus::Completed),
            "FAILED" => Ok(DocumentStatus::Failed),
            other => bail!(
                "Unknown document status: '{}'. Must be PROCESSING, COMPLETED, or FAILED.",
                other
            ),
        }
    }
}

/// An uploaded file and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub file_size: i64,
    /// Where the raw bytes were written. Opaque to clients.
    #[serde(skip_serializing)]
    pub upload_path: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Build a fresh document in the `PROCESSING` state with a new id.
    pub fn new_processing(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        file_size: i64,
        upload_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            content_type: content_type.into(),
            file_size,
            upload_path: upload_path.into(),
            status: DocumentStatus::Processing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a terminal status and bump `updated_at`.
    ///
    /// Fails if the document is already terminal or if `next` is
    /// `PROCESSING`.
    pub fn transition_to(&mut self, next: DocumentStatus) -> anyhow::Result<()> {
        if self.status.is_terminal() {
            bail!(
                "document {} is already {} and cannot move to {}",
                self.id,
                self.status,
                next
            );
        }
        if !next.is_terminal() {
            bail!("document {} cannot move back to {}", self.id, next);
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A bounded, overlapping window of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Zero-based, dense position within the document.
    pub chunk_index: i32,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub token_count: i32,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn new(
        document_id: Uuid,
        chunk_index: i32,
        content: impl Into<String>,
        embedding: Option<Vec<f32>>,
        token_count: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            content: content.into(),
            embedding,
            token_count,
            created_at: Utc::now(),
        }
    }
}

/// A chunk together with the component scores of the hybrid ranking.
///
/// Produced by [`VectorStore::hybrid_search_with_scores`](crate::store::VectorStore::hybrid_search_with_scores).
/// The chunk's embedding is not loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    /// `1 - cosine_distance`, or `0.0` when the chunk has no embedding.
    pub vector_similarity: f64,
    pub text_rank: f64,
    pub hybrid_score: f64,
}

/// Which retrieval path produced a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Vector + full-text composite ranking.
    HybridSearch,
    /// Substring search because the query embedding was unavailable.
    TextSearch,
    /// Substring search because the vector path raised an error.
    TextSearchFallback,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::HybridSearch => "hybrid_search",
            SearchMethod::TextSearch => "text_search",
            SearchMethod::TextSearchFallback => "text_search_fallback",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved chunk with optional scores and the method tag.
///
/// Hybrid results always carry all three scores; fallback results carry none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub vector_similarity: Option<f64>,
    pub text_rank: Option<f64>,
    pub hybrid_score: Option<f64>,
    pub search_method: SearchMethod,
}

impl SearchResult {
    pub fn hybrid(scored: ScoredChunk) -> Self {
        Self {
            chunk: scored.chunk,
            vector_similarity: Some(scored.vector_similarity),
            text_rank: Some(scored.text_rank),
            hybrid_score: Some(scored.hybrid_score),
            search_method: SearchMethod::HybridSearch,
        }
    }

    pub fn unscored(chunk: DocumentChunk, method: SearchMethod) -> Self {
        Self {
            chunk,
            vector_similarity: None,
            text_rank: None,
            hybrid_score: None,
            search_method: method,
        }
    }
}
