//! CLI command implementations.
//!
//! Each `run_*` function loads what it needs from an [`AppContext`] and
//! prints pretty JSON to stdout. Logs go to stderr.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use uuid::Uuid;

use docqa_core::models::{Document, DocumentChunk, DocumentStatus, Upload};
use docqa_core::validate::content_type_for_filename;

use crate::context::AppContext;
use crate::ingest::IngestionPipeline;
use crate::search::Retriever;

/// Which retriever entry point `search` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    /// Hybrid ranking with component scores and method tag.
    Scored,
    /// Hybrid ranking over embedded chunks, chunks only.
    Hybrid,
    /// Nearest neighbours under the configured metric.
    Vector,
}

#[derive(Serialize)]
struct DocumentView {
    #[serde(flatten)]
    document: Document,
    chunk_count: i64,
}

#[derive(Serialize)]
struct ChunkView {
    id: Uuid,
    chunk_index: i32,
    token_count: i32,
    embedded: bool,
    content: String,
}

impl From<DocumentChunk> for ChunkView {
    fn from(c: DocumentChunk) -> Self {
        Self {
            id: c.id,
            chunk_index: c.chunk_index,
            token_count: c.token_count,
            embedded: c.embedding.is_some(),
            content: c.content,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid document id: {}", id))
}

/// Ingest a local file and wait for background processing to finish.
pub async fn run_upload(ctx: &AppContext, path: &Path, content_type: Option<String>) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let content_type = content_type.or_else(|| {
        filename
            .as_deref()
            .and_then(content_type_for_filename)
            .map(str::to_string)
    });

    let pipeline = IngestionPipeline::new(ctx.clone());
    let upload = Upload {
        filename,
        content_type,
        bytes,
    };
    let doc = pipeline.ingest(upload).await?;
    pipeline.wait_for(doc.id).await;

    let doc = ctx
        .store
        .find_document(doc.id)
        .await?
        .with_context(|| format!("Document {} disappeared", doc.id))?;
    let chunk_count = ctx.store.count_chunks(doc.id).await?;
    print_json(&DocumentView {
        document: doc,
        chunk_count,
    })
}

pub async fn run_search(ctx: &AppContext, query: &str, mode: SearchMode, limit: i64) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }
    let retriever = Retriever::new(ctx.clone());
    match mode {
        SearchMode::Scored => print_json(&retriever.search(query, limit).await?),
        SearchMode::Hybrid => {
            let chunks = retriever.search_hybrid(query, limit).await?;
            print_json(&chunks.into_iter().map(ChunkView::from).collect::<Vec<_>>())
        }
        SearchMode::Vector => {
            let chunks = retriever.search_chunks(query, limit).await?;
            print_json(&chunks.into_iter().map(ChunkView::from).collect::<Vec<_>>())
        }
    }
}

pub async fn run_documents(
    ctx: &AppContext,
    status: Option<String>,
    keyword: Option<String>,
    limit: i64,
) -> Result<()> {
    let docs = match (keyword, status) {
        (Some(_), Some(_)) => bail!("--status and --keyword cannot be combined"),
        (Some(kw), None) => ctx.store.search_documents(&kw, limit).await?,
        (None, status) => {
            let status = status.as_deref().map(DocumentStatus::from_str).transpose()?;
            ctx.store.list_documents(status).await?
        }
    };
    print_json(&docs)
}

pub async fn run_chunks(ctx: &AppContext, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let chunks = ctx.store.find_chunks_by_document(id).await?;
    print_json(&chunks.into_iter().map(ChunkView::from).collect::<Vec<_>>())
}

pub async fn run_show(ctx: &AppContext, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let Some(document) = ctx.store.find_document(id).await? else {
        bail!("Document not found: {}", id);
    };
    let chunk_count = ctx.store.count_chunks(id).await?;
    print_json(&DocumentView {
        document,
        chunk_count,
    })
}
