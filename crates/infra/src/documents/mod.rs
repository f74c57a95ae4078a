//! Document and chunk access used by the embedding pipeline.
//!
//! Documents and chunks are owned by the surrounding application; this crate
//! only touches a document's `embedding_status` and the embedding columns of
//! its chunks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docembed_core::{ChunkId, DocumentId, EmbeddingStatus};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

/// A chunk that still has no embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChunk {
    pub id: ChunkId,
    pub content: String,
}

/// Embedding result to persist for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEmbedding {
    pub chunk_id: ChunkId,
    pub embedding: Vec<f32>,
    pub model: String,
    pub embedded_at: DateTime<Utc>,
}

/// Document store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),
    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Access to documents and their chunks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Atomically move `embedding_status` to `processing` unless it already is.
    ///
    /// Returns `true` only if this call changed the row. Implementations must
    /// evaluate the predicate and the write as one statement (or one
    /// serializable transaction). Unknown documents return `false`.
    async fn try_mark_processing(&self, document_id: DocumentId) -> Result<bool, DocumentStoreError>;

    /// Unconditionally overwrite `embedding_status`.
    async fn set_embedding_status(
        &self,
        document_id: DocumentId,
        status: EmbeddingStatus,
    ) -> Result<(), DocumentStoreError>;

    /// Current `embedding_status`, `None` for unknown documents.
    async fn embedding_status(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<EmbeddingStatus>, DocumentStoreError>;

    /// Chunks of the document whose embedding is still null.
    async fn pending_chunks(&self, document_id: DocumentId) -> Result<Vec<PendingChunk>, DocumentStoreError>;

    /// Persist one chunk's embedding, model and timestamp.
    async fn save_chunk_embedding(&self, embedding: &ChunkEmbedding) -> Result<(), DocumentStoreError>;
}
