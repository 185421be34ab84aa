//! End-to-end ingestion tests over the in-memory store.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docqa::chunk::Chunker;
use docqa::context::AppContext;
use docqa::embedding::DisabledProvider;
use docqa::ingest::IngestionPipeline;
use docqa::models::{DocumentStatus, SearchMethod, Upload};
use docqa::search::Retriever;
use docqa::store::memory::InMemoryStore;
use docqa::store::VectorStore;
use docqa::validate::{DEFAULT_MAX_UPLOAD_BYTES, MIME_PDF, MIME_TEXT};
use docqa_core::embedding::EmbeddingProvider;

use common::{disabled_context, minimal_pdf, DelayedEmbedder, FlakyStore, WordAxisEmbedder};

fn text_upload(name: &str, body: &str) -> Upload {
    Upload::new(name, MIME_TEXT, body.as_bytes().to_vec())
}

#[tokio::test]
async fn sentences_become_one_chunk_each() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let ctx = disabled_context(store.clone(), tmp.path()).with_chunker(Chunker::new(1, 0));
    let pipeline = IngestionPipeline::new(ctx);

    let doc = pipeline
        .ingest(text_upload("greek.txt", "Alpha. Beta. Gamma."))
        .await
        .unwrap();
    assert_eq!(pipeline.wait_for(doc.id).await, Some(DocumentStatus::Completed));

    let chunks = store.find_chunks_by_document(doc.id).await.unwrap();
    let got: Vec<(i32, &str)> = chunks
        .iter()
        .map(|c| (c.chunk_index, c.content.as_str()))
        .collect();
    assert_eq!(got, vec![(0, "Alpha."), (1, "Beta."), (2, "Gamma.")]);

    let stored = store.find_document(doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert_eq!(stored.file_size, "Alpha. Beta. Gamma.".len() as i64);
}

#[tokio::test]
async fn pdf_without_embeddings_is_searchable_by_text() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let ctx = disabled_context(store.clone(), tmp.path());
    let pipeline = IngestionPipeline::new(ctx.clone());

    let doc = pipeline
        .ingest(Upload::new("phrase.pdf", MIME_PDF, minimal_pdf("docqa test phrase")))
        .await
        .unwrap();
    assert_eq!(pipeline.wait_for(doc.id).await, Some(DocumentStatus::Completed));
    assert!(store.count_chunks(doc.id).await.unwrap() >= 1);

    let chunks = store.find_chunks_by_document(doc.id).await.unwrap();
    assert!(chunks.iter().all(|c| c.embedding.is_none()));

    let results = Retriever::new(ctx).search("docqa test phrase", 5).await.unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r.search_method == SearchMethod::TextSearch && r.hybrid_score.is_none()));
    assert!(results.iter().any(|r| r.chunk.document_id == doc.id
        && r.chunk.content.contains("docqa test phrase")));
}

#[tokio::test]
async fn store_failure_mid_document_marks_failed_and_keeps_prefix() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FlakyStore::failing_save_chunk_at(3));
    let embedder = Arc::new(WordAxisEmbedder::new(&["alpha", "beta", "gamma", "delta"]));
    let ctx = AppContext::new(store.clone(), embedder.clone(), tmp.path())
        .with_chunker(Chunker::new(1, 0));
    let pipeline = IngestionPipeline::new(ctx.clone());

    let doc = pipeline
        .ingest(text_upload("four.txt", "Alpha. Beta. Gamma. Delta."))
        .await
        .unwrap();
    assert_eq!(pipeline.wait_for(doc.id).await, Some(DocumentStatus::Failed));

    let stored = store.find_document(doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Failed);
    assert!(Path::new(&stored.upload_path).exists());

    let chunks = store.find_chunks_by_document(doc.id).await.unwrap();
    let indices: Vec<i32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(chunks.iter().all(|c| c.embedding.is_some()));

    let q = embedder.embed("alpha").await.unwrap();
    let hits = store
        .hybrid_search(&q, "alpha", 10, Default::default())
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn concurrent_documents_complete_independently() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DelayedEmbedder::new(
        WordAxisEmbedder::new(&["invoice", "total", "overdue"]),
        "slow",
        Duration::from_millis(300),
    ));
    let ctx = AppContext::new(store.clone(), embedder, tmp.path()).with_chunker(Chunker::new(1, 0));
    let pipeline = IngestionPipeline::new(ctx.clone());

    let first = pipeline
        .ingest(text_upload("slow.txt", "The slow invoice total. Another slow invoice."))
        .await
        .unwrap();
    let second = pipeline
        .ingest(text_upload("fast.txt", "Overdue invoice invoice invoice."))
        .await
        .unwrap();

    assert_eq!(pipeline.wait_for(second.id).await, Some(DocumentStatus::Completed));
    let first_while_waiting = store.find_document(first.id).await.unwrap().unwrap();
    assert_eq!(first_while_waiting.status, DocumentStatus::Processing);

    assert_eq!(pipeline.wait_for(first.id).await, Some(DocumentStatus::Completed));

    let results = Retriever::new(ctx).search("invoice", 10).await.unwrap();
    assert!(results
        .iter()
        .all(|r| r.search_method == SearchMethod::HybridSearch));
    let docs: std::collections::HashSet<_> =
        results.iter().map(|r| r.chunk.document_id).collect();
    assert!(docs.contains(&first.id) && docs.contains(&second.id));

    let scores: Vec<f64> = results.iter().map(|r| r.hybrid_score.unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn invalid_uploads_are_rejected_before_any_write() {
    let tmp = TempDir::new().unwrap();
    let blob_dir = tmp.path().join("blobs");
    let store = Arc::new(InMemoryStore::new());
    let pipeline = IngestionPipeline::new(disabled_context(store.clone(), &blob_dir));

    let cases = vec![
        (Upload::new("empty.txt", MIME_TEXT, Vec::new()), "FILE_EMPTY"),
        (
            Upload {
                filename: None,
                content_type: Some(MIME_TEXT.to_string()),
                bytes: b"hi".to_vec(),
            },
            "FILENAME_NULL",
        ),
        (
            Upload::new(
                "huge.txt",
                MIME_TEXT,
                vec![b'a'; DEFAULT_MAX_UPLOAD_BYTES as usize + 1],
            ),
            "SIZE_EXCEEDED",
        ),
        (Upload::new("pic.png", "image/png", b"png".to_vec()), "UNSUPPORTED_TYPE"),
    ];

    for (upload, code) in cases {
        let err = pipeline.ingest(upload).await.unwrap_err();
        assert_eq!(err.code(), code);
        assert!(err.is_validation());
    }

    assert!(store.list_documents(None).await.unwrap().is_empty());
    assert!(!blob_dir.exists());
}

#[tokio::test]
async fn blank_text_completes_with_no_chunks() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let pipeline = IngestionPipeline::new(disabled_context(store.clone(), tmp.path()));

    let doc = pipeline.ingest(text_upload("blank.txt", "   \n\t ")).await.unwrap();
    assert_eq!(pipeline.wait_for(doc.id).await, Some(DocumentStatus::Completed));
    assert_eq!(store.count_chunks(doc.id).await.unwrap(), 0);
}

#[tokio::test]
async fn reingesting_same_bytes_creates_a_disjoint_document() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let pipeline = IngestionPipeline::new(disabled_context(store.clone(), tmp.path()));

    let a = pipeline.ingest(text_upload("same.txt", "One. Two.")).await.unwrap();
    let b = pipeline.ingest(text_upload("same.txt", "One. Two.")).await.unwrap();
    assert_eq!(pipeline.wait_for(a.id).await, Some(DocumentStatus::Completed));
    assert_eq!(pipeline.wait_for(b.id).await, Some(DocumentStatus::Completed));
    assert!(pipeline.wait_all().await.is_empty());

    assert_ne!(a.id, b.id);
    assert_ne!(a.upload_path, b.upload_path);
    let a_chunks = store.find_chunks_by_document(a.id).await.unwrap();
    let b_chunks = store.find_chunks_by_document(b.id).await.unwrap();
    assert!(!a_chunks.is_empty());
    assert!(a_chunks
        .iter()
        .all(|ca| b_chunks.iter().all(|cb| ca.id != cb.id)));
}

#[tokio::test]
async fn disabled_provider_reports_dims() {
    let provider = DisabledProvider::new(8);
    assert_eq!(provider.dims(), 8);
    assert!(provider.embed("anything").await.is_none());
}
