//! Postgres schema for the embedding queue.
//!
//! `documents` and `chunks` normally belong to the host application; the DDL
//! below creates them only when absent so a fresh database can run the queue
//! end to end. Embeddings are stored as `real[]`.

use sqlx::PgPool;
use tracing::info;

/// Idempotent DDL for every table the queue reads or writes.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id UUID PRIMARY KEY,
    embedding_status TEXT NOT NULL DEFAULT 'idle'
        CHECK (embedding_status IN ('idle', 'processing', 'complete', 'partial', 'error')),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS chunks (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    content TEXT NOT NULL,
    embedding REAL[],
    embedding_model TEXT,
    embedded_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS chunks_unembedded_idx
    ON chunks (document_id, chunk_index)
    WHERE embedding IS NULL;

CREATE TABLE IF NOT EXISTS embedding_jobs (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processing', 'complete', 'error')),
    priority INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
    max_retries INTEGER NOT NULL DEFAULT 3 CHECK (max_retries >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    error_message TEXT,
    CHECK (retry_count <= max_retries)
);

CREATE INDEX IF NOT EXISTS embedding_jobs_eligible_idx
    ON embedding_jobs (status, priority, created_at);

CREATE INDEX IF NOT EXISTS embedding_jobs_document_idx
    ON embedding_jobs (document_id, status);
"#;

/// Apply [`SCHEMA`] to the database.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("embedding queue schema ensured");
    Ok(())
}
