//! Store tests against a live Postgres with the `vector` extension.
//!
//! Skipped unless `DOCQA_TEST_DATABASE_URL` points at a scratch database.
//! The schema is created with 3-dimensional embeddings.

use sqlx::postgres::PgPoolOptions;

use docqa::migrate::apply_schema;
use docqa::models::{Document, DocumentChunk, DocumentStatus};
use docqa::pg_store::PgVectorStore;
use docqa::store::{DistanceMetric, HybridWeights, VectorStore};

const DIM: usize = 3;

async fn store() -> Option<PgVectorStore> {
    let url = std::env::var("DOCQA_TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .unwrap();
    apply_schema(&pool, DIM).await.unwrap();
    Some(PgVectorStore::new(pool))
}

async fn document(store: &PgVectorStore, chunks: &[(&str, Option<Vec<f32>>)], finish: bool) -> Document {
    let mut doc = Document::new_processing(
        format!("pg-test-{}.txt", uuid::Uuid::new_v4()),
        "text/plain",
        1,
        "/tmp/pg-test",
    );
    store.save_document(&doc).await.unwrap();
    for (i, (text, emb)) in chunks.iter().enumerate() {
        let chunk = DocumentChunk::new(doc.id, i as i32, *text, emb.clone(), 1);
        store.save_chunk(&chunk).await.unwrap();
    }
    if finish {
        doc.transition_to(DocumentStatus::Completed).unwrap();
        store.update_document(&doc).await.unwrap();
    }
    doc
}

#[tokio::test]
async fn document_round_trip_and_status_update() {
    let Some(store) = store().await else { return };
    let doc = document(&store, &[("one", None), ("two", Some(vec![1.0, 0.0, 0.0]))], true).await;

    let found = store.find_document(doc.id).await.unwrap().unwrap();
    assert_eq!(found.status, DocumentStatus::Completed);
    assert_eq!(found.filename, doc.filename);
    assert!(found.updated_at >= found.created_at);

    let chunks = store.find_chunks_by_document(doc.id).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].embedding, None);
    assert_eq!(chunks[1].embedding, Some(vec![1.0, 0.0, 0.0]));
    assert_eq!(store.count_chunks(doc.id).await.unwrap(), 2);

    let completed = store
        .list_documents(Some(DocumentStatus::Completed))
        .await
        .unwrap();
    assert!(completed.iter().any(|d| d.id == doc.id));

    assert_eq!(store.delete_chunks_by_document(doc.id).await.unwrap(), 2);
}

#[tokio::test]
async fn duplicate_chunk_index_is_rejected() {
    let Some(store) = store().await else { return };
    let doc = document(&store, &[("first", None)], false).await;
    let dup = DocumentChunk::new(doc.id, 0, "again", None, 1);
    assert!(store.save_chunk(&dup).await.is_err());
}

#[tokio::test]
async fn scored_hybrid_admits_unembedded_keyword_matches() {
    let Some(store) = store().await else { return };
    let marker = format!("zq{}", uuid::Uuid::new_v4().simple());
    let with_vec = format!("{marker} embedded");
    let without_vec = format!("{marker} plain");
    let doc = document(
        &store,
        &[
            (with_vec.as_str(), Some(vec![1.0, 0.0, 0.0])),
            (without_vec.as_str(), None),
        ],
        true,
    )
    .await;

    let rows = store
        .hybrid_search_with_scores(&[1.0, 0.0, 0.0], &marker, 1000, HybridWeights::default())
        .await
        .unwrap();
    let plain = rows
        .iter()
        .find(|r| r.chunk.document_id == doc.id && r.chunk.chunk_index == 1)
        .unwrap();
    assert_eq!(plain.vector_similarity, 0.0);
    assert!((plain.hybrid_score - plain.text_rank).abs() < 1e-9);

    let embedded = rows
        .iter()
        .find(|r| r.chunk.document_id == doc.id && r.chunk.chunk_index == 0)
        .unwrap();
    assert!((embedded.vector_similarity - 1.0).abs() < 1e-6);

    let unscored = store
        .hybrid_search(&[1.0, 0.0, 0.0], &marker, 1000, HybridWeights::default())
        .await
        .unwrap();
    assert!(unscored
        .iter()
        .filter(|c| c.document_id == doc.id)
        .all(|c| c.chunk_index == 0));

    let text = store.text_contains(&marker.to_uppercase(), 10).await.unwrap();
    let indices: Vec<i32> = text.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1]);

    let nearest = store
        .nearest_chunks(&[1.0, 0.0, 0.0], 1, DistanceMetric::L2)
        .await
        .unwrap();
    assert_eq!(nearest.len(), 1);
}

#[tokio::test]
async fn processing_documents_are_invisible_to_retrieval() {
    let Some(store) = store().await else { return };
    let marker = format!("zq{}", uuid::Uuid::new_v4().simple());
    let content = format!("{marker} hidden");
    let doc = document(&store, &[(content.as_str(), Some(vec![0.0, 1.0, 0.0]))], false).await;

    let hits = store.text_contains(&marker, 10).await.unwrap();
    assert!(hits.iter().all(|c| c.document_id != doc.id));
    let hits = store
        .hybrid_search_with_scores(&[0.0, 1.0, 0.0], &marker, 1000, HybridWeights::default())
        .await
        .unwrap();
    assert!(hits.iter().all(|r| r.chunk.document_id != doc.id));
}
