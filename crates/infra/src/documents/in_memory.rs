//! In-memory document/chunk store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docembed_core::{ChunkId, DocumentId, EmbeddingStatus};

use super::{ChunkEmbedding, DocumentStore, DocumentStoreError, PendingChunk};

/// Stored chunk row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub embedded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    documents: HashMap<DocumentId, EmbeddingStatus>,
    // Insertion order doubles as chunk order.
    chunks: Vec<ChunkRecord>,
}

/// In-memory document store.
///
/// A single write lock around both tables gives `try_mark_processing` the same
/// atomicity as a conditional `UPDATE`.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    tables: RwLock<Tables>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, DocumentStoreError> {
        self.tables
            .read()
            .map_err(|_| DocumentStoreError::Storage("document tables lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, DocumentStoreError> {
        self.tables
            .write()
            .map_err(|_| DocumentStoreError::Storage("document tables lock poisoned".to_string()))
    }

    /// Register a document in `idle` state.
    pub fn insert_document(&self, document_id: DocumentId) -> Result<(), DocumentStoreError> {
        self.write()?
            .documents
            .insert(document_id, EmbeddingStatus::Idle);
        Ok(())
    }

    /// Append an un-embedded chunk to a document.
    pub fn add_chunk(
        &self,
        document_id: DocumentId,
        content: impl Into<String>,
    ) -> Result<ChunkId, DocumentStoreError> {
        let mut tables = self.write()?;
        if !tables.documents.contains_key(&document_id) {
            return Err(DocumentStoreError::DocumentNotFound(document_id));
        }
        let id = ChunkId::new();
        tables.chunks.push(ChunkRecord {
            id,
            document_id,
            content: content.into(),
            embedding: None,
            embedding_model: None,
            embedded_at: None,
        });
        Ok(id)
    }

    /// All chunks of a document, embedded or not.
    pub fn chunks(&self, document_id: DocumentId) -> Result<Vec<ChunkRecord>, DocumentStoreError> {
        Ok(self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn try_mark_processing(&self, document_id: DocumentId) -> Result<bool, DocumentStoreError> {
        let mut tables = self.write()?;
        match tables.documents.get_mut(&document_id) {
            Some(status) if *status != EmbeddingStatus::Processing => {
                *status = EmbeddingStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_embedding_status(
        &self,
        document_id: DocumentId,
        status: EmbeddingStatus,
    ) -> Result<(), DocumentStoreError> {
        let mut tables = self.write()?;
        let current = tables
            .documents
            .get_mut(&document_id)
            .ok_or(DocumentStoreError::DocumentNotFound(document_id))?;
        *current = status;
        Ok(())
    }

    async fn embedding_status(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<EmbeddingStatus>, DocumentStoreError> {
        Ok(self.read()?.documents.get(&document_id).copied())
    }

    async fn pending_chunks(&self, document_id: DocumentId) -> Result<Vec<PendingChunk>, DocumentStoreError> {
        Ok(self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id && c.embedding.is_none())
            .map(|c| PendingChunk {
                id: c.id,
                content: c.content.clone(),
            })
            .collect())
    }

    async fn save_chunk_embedding(&self, embedding: &ChunkEmbedding) -> Result<(), DocumentStoreError> {
        let mut tables = self.write()?;
        let chunk = tables
            .chunks
            .iter_mut()
            .find(|c| c.id == embedding.chunk_id)
            .ok_or(DocumentStoreError::ChunkNotFound(embedding.chunk_id))?;
        chunk.embedding = Some(embedding.embedding.clone());
        chunk.embedding_model = Some(embedding.model.clone());
        chunk.embedded_at = Some(embedding.embedded_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_processing_is_compare_and_swap() {
        let store = InMemoryDocumentStore::new();
        let doc = DocumentId::new();
        store.insert_document(doc).unwrap();

        assert!(store.try_mark_processing(doc).await.unwrap());
        assert!(!store.try_mark_processing(doc).await.unwrap());

        store
            .set_embedding_status(doc, EmbeddingStatus::Partial)
            .await
            .unwrap();
        assert!(store.try_mark_processing(doc).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_document_is_never_marked() {
        let store = InMemoryDocumentStore::new();
        assert!(!store.try_mark_processing(DocumentId::new()).await.unwrap());
        assert_eq!(store.embedding_status(DocumentId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn embedded_chunks_leave_pending_set() {
        let store = InMemoryDocumentStore::new();
        let doc = DocumentId::new();
        store.insert_document(doc).unwrap();
        let a = store.add_chunk(doc, "alpha").unwrap();
        let b = store.add_chunk(doc, "beta").unwrap();

        store
            .save_chunk_embedding(&ChunkEmbedding {
                chunk_id: a,
                embedding: vec![0.1, 0.2],
                model: "test-model".to_string(),
                embedded_at: Utc::now(),
            })
            .await
            .unwrap();

        let pending = store.pending_chunks(doc).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);
        assert_eq!(pending[0].content, "beta");
    }

    #[tokio::test]
    async fn write_for_unknown_chunk_fails() {
        let store = InMemoryDocumentStore::new();
        let chunk = ChunkId::new();

        let result = store
            .save_chunk_embedding(&ChunkEmbedding {
                chunk_id: chunk,
                embedding: vec![1.0],
                model: "m".to_string(),
                embedded_at: Utc::now(),
            })
            .await;
        assert!(matches!(result, Err(DocumentStoreError::ChunkNotFound(id)) if id == chunk));
    }
}
