//! Postgres-backed document/chunk store.
//!
//! The lock acquisition is a single conditional `UPDATE`:
//!
//! ```sql
//! UPDATE documents SET embedding_status = 'processing'
//! WHERE id = $1 AND embedding_status <> 'processing'
//! ```
//!
//! Under READ COMMITTED a concurrent updater blocks on the row lock, then
//! re-evaluates the predicate against the committed row, so exactly one
//! caller sees `rows_affected() == 1`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use docembed_core::{ChunkId, DocumentId, EmbeddingStatus};

use super::{ChunkEmbedding, DocumentStore, DocumentStoreError, PendingChunk};

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), fields(document_id = %document_id), err)]
    async fn try_mark_processing(&self, document_id: DocumentId) -> Result<bool, DocumentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET embedding_status = 'processing', updated_at = now()
            WHERE id = $1 AND embedding_status <> 'processing'
            "#,
        )
        .bind(document_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("try_mark_processing", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(document_id = %document_id, status = %status), err)]
    async fn set_embedding_status(
        &self,
        document_id: DocumentId,
        status: EmbeddingStatus,
    ) -> Result<(), DocumentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET embedding_status = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_uuid())
        .bind(status.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_embedding_status", e))?;

        if result.rows_affected() == 0 {
            return Err(DocumentStoreError::DocumentNotFound(document_id));
        }
        Ok(())
    }

    async fn embedding_status(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<EmbeddingStatus>, DocumentStoreError> {
        let row = sqlx::query("SELECT embedding_status FROM documents WHERE id = $1")
            .bind(document_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("embedding_status", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row
            .try_get("embedding_status")
            .map_err(|e| map_sqlx_error("embedding_status", e))?;
        raw.parse::<EmbeddingStatus>()
            .map(Some)
            .map_err(|e: docembed_core::DomainError| DocumentStoreError::Storage(e.to_string()))
    }

    #[instrument(skip(self), fields(document_id = %document_id), err)]
    async fn pending_chunks(&self, document_id: DocumentId) -> Result<Vec<PendingChunk>, DocumentStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, content
            FROM chunks
            WHERE document_id = $1 AND embedding IS NULL
            ORDER BY chunk_index ASC, id ASC
            "#,
        )
        .bind(document_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_chunks", e))?;

        rows.iter()
            .map(|row| -> Result<PendingChunk, sqlx::Error> {
                Ok(PendingChunk {
                    id: ChunkId::from_uuid(row.try_get("id")?),
                    content: row.try_get("content")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("pending_chunks", e))
    }

    async fn save_chunk_embedding(&self, embedding: &ChunkEmbedding) -> Result<(), DocumentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE chunks
            SET embedding = $2, embedding_model = $3, embedded_at = $4
            WHERE id = $1
            "#,
        )
        .bind(embedding.chunk_id.as_uuid())
        .bind(&embedding.embedding)
        .bind(&embedding.model)
        .bind(embedding.embedded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_chunk_embedding", e))?;

        if result.rows_affected() == 0 {
            return Err(DocumentStoreError::ChunkNotFound(embedding.chunk_id));
        }
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DocumentStoreError {
    match err {
        sqlx::Error::Database(db_err) => DocumentStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            DocumentStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => DocumentStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
