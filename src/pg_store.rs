//! Postgres + pgvector implementation of [`VectorStore`].
//!
//! Vectors cross the wire in their text form (`[v0,v1,...]`): bound as text
//! and cast with `$n::text::vector`, and selected back as `embedding::text`.
//! Full-text matching uses the `english` configuration, so results line up
//! with the GIN index created by [`crate::migrate`].
//!
//! Every retrieval query joins `document` and keeps only `COMPLETED` rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use docqa_core::embedding::{format_for_vector_store, parse_vector};
use docqa_core::models::{Document, DocumentChunk, DocumentStatus, ScoredChunk};
use docqa_core::store::{DistanceMetric, HybridWeights, VectorStore};

const DOCUMENT_COLUMNS: &str = "d.id, d.filename, d.content_type, d.file_size, d.upload_path, \
                                d.status, d.created_at, d.updated_at";

const CHUNK_COLUMNS: &str = "dc.id, dc.document_id, dc.chunk_index, dc.content, \
                             dc.embedding::text AS embedding, dc.token_count, dc.created_at";

const COMPLETED_CHUNKS: &str =
    "FROM document_chunk dc JOIN document d ON dc.document_id = d.id WHERE d.status = 'COMPLETED'";

/// Keyword predicate over `dc.content`; the keyword is always `$2`.
const KEYWORD_MATCH: &str = "(dc.content ILIKE '%' || $2 || '%' \
                             OR to_tsvector('english', dc.content) @@ plainto_tsquery('english', $2))";

const TEXT_RANK: &str = "ts_rank(to_tsvector('english', dc.content), plainto_tsquery('english', $2))";

/// Output columns of the scored hybrid query.
///
/// The SELECT list is generated from [`ScoredColumn::ALL`] and rows are
/// decoded through [`ScoredColumn::index`], so position and meaning cannot
/// drift apart. Parameters: `$1` query vector, `$2` keyword, `$3` limit,
/// `$4` vector weight, `$5` text weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScoredColumn {
    Id,
    DocumentId,
    ChunkIndex,
    Content,
    TokenCount,
    CreatedAt,
    VectorSimilarity,
    TextRank,
    HybridScore,
}

impl ScoredColumn {
    const ALL: [ScoredColumn; 9] = [
        ScoredColumn::Id,
        ScoredColumn::DocumentId,
        ScoredColumn::ChunkIndex,
        ScoredColumn::Content,
        ScoredColumn::TokenCount,
        ScoredColumn::CreatedAt,
        ScoredColumn::VectorSimilarity,
        ScoredColumn::TextRank,
        ScoredColumn::HybridScore,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn alias(self) -> &'static str {
        match self {
            ScoredColumn::Id => "id",
            ScoredColumn::DocumentId => "document_id",
            ScoredColumn::ChunkIndex => "chunk_index",
            ScoredColumn::Content => "content",
            ScoredColumn::TokenCount => "token_count",
            ScoredColumn::CreatedAt => "created_at",
            ScoredColumn::VectorSimilarity => "vector_similarity",
            ScoredColumn::TextRank => "text_rank",
            ScoredColumn::HybridScore => "hybrid_score",
        }
    }

    fn expr(self) -> String {
        match self {
            ScoredColumn::Id => "dc.id".to_string(),
            ScoredColumn::DocumentId => "dc.document_id".to_string(),
            ScoredColumn::ChunkIndex => "dc.chunk_index".to_string(),
            ScoredColumn::Content => "dc.content".to_string(),
            ScoredColumn::TokenCount => "dc.token_count".to_string(),
            ScoredColumn::CreatedAt => "dc.created_at".to_string(),
            ScoredColumn::VectorSimilarity => "(CASE WHEN dc.embedding IS NOT NULL \
                 THEN 1 - (dc.embedding <=> $1::text::vector) ELSE 0.0 END)::float8"
                .to_string(),
            ScoredColumn::TextRank => format!("({TEXT_RANK})::float8"),
            ScoredColumn::HybridScore => format!(
                "(CASE WHEN dc.embedding IS NOT NULL \
                 THEN ($4::float8 * (1 - (dc.embedding <=> $1::text::vector))) \
                 + ($5::float8 * {TEXT_RANK}) \
                 ELSE {TEXT_RANK} END)::float8"
            ),
        }
    }
}

fn scored_hybrid_sql() -> String {
    let select_list = ScoredColumn::ALL
        .iter()
        .map(|c| format!("{} AS {}", c.expr(), c.alias()))
        .collect::<Vec<_>>()
        .join(",\n       ");
    format!(
        "SELECT {select_list}\n{COMPLETED_CHUNKS}\n\
         AND (dc.embedding IS NOT NULL OR {KEYWORD_MATCH})\n\
         ORDER BY hybrid_score DESC, dc.chunk_index ASC\n\
         LIMIT $3"
    )
}

fn hybrid_sql() -> String {
    format!(
        "SELECT {CHUNK_COLUMNS}\n{COMPLETED_CHUNKS}\n\
         AND dc.embedding IS NOT NULL\n\
         AND {KEYWORD_MATCH}\n\
         ORDER BY ($4::float8 * (1 - (dc.embedding <=> $1::text::vector))) \
         + ($5::float8 * {TEXT_RANK}) DESC\n\
         LIMIT $3"
    )
}

fn distance_operator(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "<=>",
        DistanceMetric::L2 => "<->",
    }
}

fn nearest_sql(metric: DistanceMetric) -> String {
    format!(
        "SELECT {CHUNK_COLUMNS}\n{COMPLETED_CHUNKS}\n\
         AND dc.embedding IS NOT NULL\n\
         ORDER BY dc.embedding {} $1::text::vector\n\
         LIMIT $2",
        distance_operator(metric)
    )
}

fn text_contains_sql() -> String {
    format!(
        "SELECT {CHUNK_COLUMNS}\n{COMPLETED_CHUNKS}\n\
         AND dc.content ILIKE '%' || $1 || '%'\n\
         ORDER BY dc.chunk_index ASC, dc.created_at ASC\n\
         LIMIT $2"
    )
}

fn parse_status(raw: &str) -> Result<DocumentStatus> {
    raw.parse()
}

fn decode_document(row: &PgRow) -> Result<Document> {
    let status: String = row.try_get("status")?;
    let created_at: NaiveDateTime = row.try_get("created_at")?;
    let updated_at: NaiveDateTime = row.try_get("updated_at")?;
    Ok(Document {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        content_type: row.try_get("content_type")?,
        file_size: row.try_get("file_size")?,
        upload_path: row.try_get("upload_path")?,
        status: parse_status(&status)?,
        created_at: created_at.and_utc(),
        updated_at: updated_at.and_utc(),
    })
}

fn decode_chunk(row: &PgRow) -> Result<DocumentChunk> {
    let embedding: Option<String> = row.try_get("embedding")?;
    let embedding = embedding
        .as_deref()
        .map(parse_vector)
        .transpose()
        .context("Failed to decode stored embedding")?;
    let created_at: NaiveDateTime = row.try_get("created_at")?;
    Ok(DocumentChunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        embedding,
        token_count: row.try_get("token_count")?,
        created_at: created_at.and_utc(),
    })
}

fn decode_scored(row: &PgRow) -> Result<ScoredChunk> {
    use ScoredColumn as C;
    let created_at: NaiveDateTime = row.try_get(C::CreatedAt.index())?;
    Ok(ScoredChunk {
        chunk: DocumentChunk {
            id: row.try_get(C::Id.index())?,
            document_id: row.try_get(C::DocumentId.index())?,
            chunk_index: row.try_get(C::ChunkIndex.index())?,
            content: row.try_get(C::Content.index())?,
            embedding: None,
            token_count: row.try_get(C::TokenCount.index())?,
            created_at: created_at.and_utc(),
        },
        vector_similarity: row.try_get(C::VectorSimilarity.index())?,
        text_rank: row.try_get(C::TextRank.index())?,
        hybrid_score: row.try_get(C::HybridScore.index())?,
    })
}

pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert_document(&self, doc: &Document, stamp_now: bool) -> Result<()> {
        let updated_at = if stamp_now {
            "(NOW() AT TIME ZONE 'UTC')"
        } else {
            "$8"
        };
        let sql = format!(
            r#"
            INSERT INTO document (id, filename, content_type, file_size, upload_path, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, {updated_at})
            ON CONFLICT (id) DO UPDATE SET
                filename = EXCLUDED.filename,
                content_type = EXCLUDED.content_type,
                file_size = EXCLUDED.file_size,
                upload_path = EXCLUDED.upload_path,
                status = EXCLUDED.status,
                updated_at = (NOW() AT TIME ZONE 'UTC')
            "#
        );
        let mut query = sqlx::query(&sql)
            .bind(doc.id)
            .bind(&doc.filename)
            .bind(&doc.content_type)
            .bind(doc.file_size)
            .bind(&doc.upload_path)
            .bind(doc.status.as_str())
            .bind(doc.created_at.naive_utc());
        if !stamp_now {
            query = query.bind(doc.updated_at.naive_utc());
        }
        query
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to save document {}", doc.id))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        self.upsert_document(doc, false).await
    }

    async fn update_document(&self, doc: &Document) -> Result<()> {
        self.upsert_document(doc, true).await
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM document d WHERE d.id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_document).transpose()
    }

    async fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document d \
             WHERE ($1::text IS NULL OR d.status = $1) \
             ORDER BY d.created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_document).collect()
    }

    async fn search_documents(&self, keyword: &str, k: i64) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document d \
             WHERE d.status = 'COMPLETED' \
             AND EXISTS (SELECT 1 FROM document_chunk dc \
                         WHERE dc.document_id = d.id AND dc.content ILIKE '%' || $1 || '%') \
             ORDER BY d.created_at DESC \
             LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(keyword)
            .bind(k.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_document).collect()
    }

    async fn save_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_chunk (id, document_id, chunk_index, content, embedding, token_count, created_at)
            VALUES ($1, $2, $3, $4, $5::text::vector, $6, $7)
            "#,
        )
        .bind(chunk.id)
        .bind(chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(chunk.embedding.as_deref().map(format_for_vector_store))
        .bind(chunk.token_count)
        .bind(chunk.created_at.naive_utc())
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to save chunk {} of document {}",
                chunk.chunk_index, chunk.document_id
            )
        })?;
        Ok(())
    }

    async fn find_chunks_by_document(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM document_chunk dc \
             WHERE dc.document_id = $1 ORDER BY dc.chunk_index ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_chunk).collect()
    }

    async fn count_chunks(&self, document_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunk WHERE document_id = $1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: i64,
        metric: DistanceMetric,
    ) -> Result<Vec<DocumentChunk>> {
        let sql = nearest_sql(metric);
        let rows = sqlx::query(&sql)
            .bind(format_for_vector_store(query))
            .bind(k.max(0))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("{} kNN query failed", metric.as_str()))?;
        rows.iter().map(decode_chunk).collect()
    }

    async fn hybrid_search(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<DocumentChunk>> {
        let sql = hybrid_sql();
        let rows = sqlx::query(&sql)
            .bind(format_for_vector_store(query))
            .bind(keyword)
            .bind(k.max(0))
            .bind(weights.vector)
            .bind(weights.text)
            .fetch_all(&self.pool)
            .await
            .context("hybrid query failed")?;
        rows.iter().map(decode_chunk).collect()
    }

    async fn hybrid_search_with_scores(
        &self,
        query: &[f32],
        keyword: &str,
        k: i64,
        weights: HybridWeights,
    ) -> Result<Vec<ScoredChunk>> {
        let sql = scored_hybrid_sql();
        let rows = sqlx::query(&sql)
            .bind(format_for_vector_store(query))
            .bind(keyword)
            .bind(k.max(0))
            .bind(weights.vector)
            .bind(weights.text)
            .fetch_all(&self.pool)
            .await
            .context("scored hybrid query failed")?;
        rows.iter().map(decode_scored).collect()
    }

    async fn text_contains(&self, keyword: &str, k: i64) -> Result<Vec<DocumentChunk>> {
        let sql = text_contains_sql();
        let rows = sqlx::query(&sql)
            .bind(keyword)
            .bind(k.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_chunk).collect()
    }

    async fn delete_chunks_by_document(&self, document_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_chunk WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
