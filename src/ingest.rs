//! Ingestion pipeline: validate → store blob → create document, then
//! extract → chunk → embed → persist in a background task.
//!
//! [`IngestionPipeline::ingest`] returns as soon as the `PROCESSING`
//! document row exists. The rest runs on its own tokio task, one task per
//! document, so different documents proceed in parallel while the chunks of
//! one document are embedded and written strictly in index order.
//!
//! Any error in the background task moves the document to `FAILED`. The
//! blob and any chunks already written are left in place.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::anyhow;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use docqa_core::chunk::estimate_tokens;
use docqa_core::models::{Document, DocumentChunk, DocumentStatus, Upload};
use docqa_core::IngestError;

use crate::context::AppContext;

pub struct IngestionPipeline {
    ctx: AppContext,
    /// Background tasks by document id. Finished ones are pruned on the
    /// next `ingest`; their outcome stays readable from the store.
    tasks: Mutex<HashMap<Uuid, JoinHandle<DocumentStatus>>>,
}

impl IngestionPipeline {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Accept an upload and start processing it.
    ///
    /// Validation errors are returned before anything is written. On
    /// success the returned document is `PROCESSING`.
    pub async fn ingest(&self, upload: Upload) -> Result<Document, IngestError> {
        self.ctx.validator.validate(&upload)?;

        let filename = upload.filename.clone().unwrap_or_default();
        let content_type = upload.content_type.clone().unwrap_or_default();
        let file_size = i64::try_from(upload.len())
            .map_err(|_| IngestError::SizeExceeded {
                size: upload.len(),
                limit: self.ctx.validator.max_bytes(),
            })?;

        let path = self.ctx.blobs.put(&filename, &upload.bytes).await?;
        drop(upload);

        let doc = Document::new_processing(
            filename,
            content_type,
            file_size,
            path.to_string_lossy(),
        );
        self.ctx.store.save_document(&doc).await?;

        info!(
            document_id = %doc.id,
            filename = %doc.filename,
            content_type = %doc.content_type,
            bytes = doc.file_size,
            "document accepted"
        );

        let handle = tokio::spawn(process_document(self.ctx.clone(), doc.clone()));
        let mut tasks = self.tasks_guard();
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(doc.id, handle);

        Ok(doc)
    }

    /// Wait for a document's background task.
    ///
    /// Without a tracked task (already awaited or pruned) this reports the
    /// stored status instead. `None` if the document is unknown, the store
    /// lookup fails or the task panicked.
    pub async fn wait_for(&self, id: Uuid) -> Option<DocumentStatus> {
        let handle = self.tasks_guard().remove(&id);
        let Some(handle) = handle else {
            return match self.ctx.store.find_document(id).await {
                Ok(doc) => doc.map(|d| d.status),
                Err(e) => {
                    warn!(document_id = %id, error = %e, "could not read document status");
                    None
                }
            };
        };
        match handle.await {
            Ok(status) => Some(status),
            Err(e) => {
                error!(document_id = %id, error = %e, "ingestion task aborted");
                None
            }
        }
    }

    /// Wait for every background task still tracked.
    pub async fn wait_all(&self) -> Vec<(Uuid, DocumentStatus)> {
        let handles: Vec<(Uuid, JoinHandle<DocumentStatus>)> =
            self.tasks_guard().drain().collect();
        let mut out = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(status) => out.push((id, status)),
                Err(e) => error!(document_id = %id, error = %e, "ingestion task aborted"),
            }
        }
        out
    }

    fn tasks_guard(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JoinHandle<DocumentStatus>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Background half of ingestion. Always leaves the document terminal
/// unless the final status write itself fails.
async fn process_document(ctx: AppContext, doc: Document) -> DocumentStatus {
    let outcome = async {
        let count = persist_chunks(&ctx, &doc).await?;
        let mut done = doc.clone();
        done.transition_to(DocumentStatus::Completed)?;
        ctx.store.update_document(&done).await?;
        Ok::<usize, IngestError>(count)
    }
    .await;

    match outcome {
        Ok(count) => {
            info!(document_id = %doc.id, chunks = count, "document completed");
            DocumentStatus::Completed
        }
        Err(e) => {
            error!(
                document_id = %doc.id,
                code = e.code(),
                error = %e,
                "document processing failed"
            );
            let mut failed = doc.clone();
            if let Err(e) = failed.transition_to(DocumentStatus::Failed) {
                warn!(document_id = %doc.id, error = %e, "unexpected status transition");
            }
            if let Err(e) = ctx.store.update_document(&failed).await {
                error!(document_id = %doc.id, error = %e, "could not record FAILED status");
            }
            DocumentStatus::Failed
        }
    }
}

async fn persist_chunks(ctx: &AppContext, doc: &Document) -> Result<usize, IngestError> {
    let bytes = ctx.blobs.read(Path::new(&doc.upload_path)).await?;
    let text = ctx.extractor.extract(bytes, &doc.content_type).await?;
    let pieces = ctx.chunker.chunk(&text);
    debug!(
        document_id = %doc.id,
        chars = text.len(),
        chunks = pieces.len(),
        "text chunked"
    );

    let mut embedded = 0usize;
    let total = pieces.len();
    for (i, content) in pieces.into_iter().enumerate() {
        let index = i32::try_from(i).map_err(|_| anyhow!("chunk index {} out of range", i))?;
        let embedding = ctx.embedder.embed(&content).await;
        if embedding.is_some() {
            embedded += 1;
        }
        let token_count = i32::try_from(estimate_tokens(&content)).unwrap_or(i32::MAX);
        let chunk = DocumentChunk::new(doc.id, index, content, embedding, token_count);
        ctx.store.save_chunk(&chunk).await?;
        debug!(document_id = %doc.id, chunk_index = index, tokens = token_count, "chunk saved");
    }

    if embedded < total {
        warn!(
            document_id = %doc.id,
            embedded,
            total,
            "some chunks were stored without an embedding"
        );
    }

    Ok(total)
}
