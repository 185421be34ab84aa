//! Idempotent schema setup for the Postgres backend.
//!
//! Requires the `vector` extension to be installable by the connecting role.
//! The embedding column is sized from `embedding.dim`; changing the
//! dimension of an existing database is not handled here.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// Every DDL statement, in execution order, for an embedding dimension.
pub fn schema_statements(dim: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS document (
            id UUID PRIMARY KEY,
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL,
            file_size BIGINT NOT NULL,
            upload_path TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('PROCESSING', 'COMPLETED', 'FAILED')),
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#
        .to_string(),
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS document_chunk (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL REFERENCES document(id) ON DELETE CASCADE,
            chunk_index INT NOT NULL,
            content TEXT NOT NULL,
            embedding VECTOR({dim}),
            token_count INT NOT NULL CHECK (token_count >= 0),
            created_at TIMESTAMP NOT NULL,
            UNIQUE (document_id, chunk_index)
        )
        "#
        ),
        "CREATE INDEX IF NOT EXISTS idx_document_status ON document(status)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_document_created_at ON document(created_at DESC)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_document_chunk_document_id ON document_chunk(document_id)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_document_chunk_embedding_cosine \
         ON document_chunk USING hnsw (embedding vector_cosine_ops)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_document_chunk_embedding_l2 \
         ON document_chunk USING hnsw (embedding vector_l2_ops)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_document_chunk_content_fts \
         ON document_chunk USING GIN (to_tsvector('english', content))"
            .to_string(),
    ]
}

pub async fn apply_schema(pool: &PgPool, dim: usize) -> Result<()> {
    for stmt in schema_statements(dim) {
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .with_context(|| format!("Migration statement failed: {}", stmt.trim()))?;
    }
    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool, config.embedding.dim).await?;
    info!(dim = config.embedding.dim, "schema ready");
    pool.close().await;
    Ok(())
}
