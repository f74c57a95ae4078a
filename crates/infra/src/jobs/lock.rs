//! Per-document mutual exclusion on top of `embedding_status`.
//!
//! There is no lock table: `processing` on the document row *is* the lock.
//! Only [`LockManager::acquire`]'s atomic result is authoritative;
//! [`LockManager::is_locked`] is an advisory read.
//!
//! Locks never expire. A process killed while holding one leaves the document
//! in `processing` until an operator resets it.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use docembed_core::{DocumentId, EmbeddingStatus};

use crate::documents::{DocumentStore, DocumentStoreError};

/// Error returned by the scoped lock helpers.
#[derive(Debug, thiserror::Error)]
pub enum LockError<E> {
    /// Another embedding pass holds the document.
    #[error("embedding generation already in progress for document {0}")]
    LockHeld(DocumentId),
    /// The conditional update itself failed.
    #[error("failed to acquire lock: {0}")]
    Acquire(DocumentStoreError),
    /// The guarded operation failed (the lock was released).
    #[error("{0}")]
    Operation(E),
}

pub struct LockManager<D: ?Sized> {
    documents: Arc<D>,
}

impl<D: ?Sized> Clone for LockManager<D> {
    fn clone(&self) -> Self {
        Self {
            documents: self.documents.clone(),
        }
    }
}

impl<D: DocumentStore + ?Sized + 'static> LockManager<D> {
    pub fn new(documents: Arc<D>) -> Self {
        Self { documents }
    }

    /// Try to take the lock. `Ok(false)` if it is already held.
    pub async fn acquire(&self, document_id: DocumentId) -> Result<bool, DocumentStoreError> {
        let acquired = self.documents.try_mark_processing(document_id).await?;
        if acquired {
            info!(document_id = %document_id, "acquired embedding lock");
        } else {
            debug!(document_id = %document_id, "embedding lock already held");
        }
        Ok(acquired)
    }

    /// Set the final status. Failures are logged, never retried.
    pub async fn release(&self, document_id: DocumentId, final_status: EmbeddingStatus) {
        match self
            .documents
            .set_embedding_status(document_id, final_status)
            .await
        {
            Ok(()) => info!(
                document_id = %document_id,
                status = %final_status,
                "released embedding lock"
            ),
            Err(e) => error!(
                document_id = %document_id,
                status = %final_status,
                error = %e,
                "failed to release embedding lock; document stays in processing"
            ),
        }
    }

    /// Point-in-time check; may already be stale when it returns.
    pub async fn is_locked(&self, document_id: DocumentId) -> bool {
        match self.documents.embedding_status(document_id).await {
            Ok(status) => status == Some(EmbeddingStatus::Processing),
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "failed to read lock state");
                false
            }
        }
    }

    /// Run `operation` under the lock and release with `final_status`.
    pub async fn with_lock<T, E, F, Fut>(
        &self,
        document_id: DocumentId,
        final_status: EmbeddingStatus,
        operation: F,
    ) -> Result<T, LockError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.with_lock_resolved(document_id, operation, |_| final_status)
            .await
    }

    /// Run `operation` under the lock; `resolve` picks the release status
    /// from the operation's result.
    ///
    /// Once acquired, the lock is released on every exit path. If the future
    /// is dropped or panics mid-operation, release happens on a spawned task
    /// with [`EmbeddingStatus::Error`].
    pub async fn with_lock_resolved<T, E, F, Fut, R>(
        &self,
        document_id: DocumentId,
        operation: F,
        resolve: R,
    ) -> Result<T, LockError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnOnce(&Result<T, E>) -> EmbeddingStatus,
    {
        match self.acquire(document_id).await {
            Ok(true) => {}
            Ok(false) => return Err(LockError::LockHeld(document_id)),
            Err(e) => return Err(LockError::Acquire(e)),
        }

        let mut guard = ReleaseGuard {
            lock: self.clone(),
            document_id,
            armed: true,
        };
        let result = operation().await;
        guard.armed = false;

        self.release(document_id, resolve(&result)).await;
        result.map_err(LockError::Operation)
    }
}

/// Releases with `error` if the scoped operation never completed.
struct ReleaseGuard<D: DocumentStore + ?Sized + 'static> {
    lock: LockManager<D>,
    document_id: DocumentId,
    armed: bool,
}

impl<D: DocumentStore + ?Sized + 'static> Drop for ReleaseGuard<D> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let document_id = self.document_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = self.lock.clone();
                handle.spawn(async move {
                    lock.release(document_id, EmbeddingStatus::Error).await;
                });
            }
            Err(_) => error!(
                document_id = %document_id,
                "no runtime to release embedding lock; document stays in processing"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::InMemoryDocumentStore;

    fn setup() -> (Arc<InMemoryDocumentStore>, LockManager<InMemoryDocumentStore>, DocumentId) {
        let docs = InMemoryDocumentStore::arc();
        let doc = DocumentId::new();
        docs.insert_document(doc).unwrap();
        (docs.clone(), LockManager::new(docs), doc)
    }

    #[tokio::test]
    async fn second_acquire_without_release_fails() {
        let (_docs, lock, doc) = setup();
        assert!(lock.acquire(doc).await.unwrap());
        assert!(!lock.acquire(doc).await.unwrap());
        assert!(lock.is_locked(doc).await);

        lock.release(doc, EmbeddingStatus::Complete).await;
        assert!(!lock.is_locked(doc).await);
        assert!(lock.acquire(doc).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquires_admit_exactly_one() {
        let (_docs, lock, doc) = setup();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let lock = lock.clone();
            handles.push(tokio::spawn(async move { lock.acquire(doc).await.unwrap() }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn with_lock_releases_on_success_and_failure() {
        let (docs, lock, doc) = setup();

        let ok: Result<u32, LockError<String>> = lock
            .with_lock(doc, EmbeddingStatus::Complete, || async { Ok(7) })
            .await;
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(
            docs.embedding_status(doc).await.unwrap(),
            Some(EmbeddingStatus::Complete)
        );

        let err: Result<u32, LockError<String>> = lock
            .with_lock(doc, EmbeddingStatus::Partial, || async { Err("boom".to_string()) })
            .await;
        assert!(matches!(err, Err(LockError::Operation(ref m)) if m == "boom"));
        assert_eq!(
            docs.embedding_status(doc).await.unwrap(),
            Some(EmbeddingStatus::Partial)
        );
    }

    #[tokio::test]
    async fn with_lock_does_not_run_when_held() {
        let (_docs, lock, doc) = setup();
        assert!(lock.acquire(doc).await.unwrap());

        let mut ran = false;
        let result: Result<(), LockError<String>> = lock
            .with_lock(doc, EmbeddingStatus::Complete, || {
                ran = true;
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(LockError::LockHeld(d)) if d == doc));
        assert!(!ran);
        // The holder's lock is untouched.
        assert!(lock.is_locked(doc).await);
    }

    #[tokio::test]
    async fn resolved_status_follows_result() {
        let (docs, lock, doc) = setup();
        let result: Result<usize, LockError<String>> = lock
            .with_lock_resolved(
                doc,
                || async { Ok(2) },
                |r| match r {
                    Ok(failed) if *failed > 0 => EmbeddingStatus::Partial,
                    Ok(_) => EmbeddingStatus::Complete,
                    Err(_) => EmbeddingStatus::Error,
                },
            )
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(
            docs.embedding_status(doc).await.unwrap(),
            Some(EmbeddingStatus::Partial)
        );
    }

    #[tokio::test]
    async fn dropped_operation_still_releases() {
        let (docs, lock, doc) = setup();

        let fut = lock.with_lock(doc, EmbeddingStatus::Complete, || async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok::<_, String>(())
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), fut).await;
        assert!(timed_out.is_err());

        for _ in 0..50 {
            if docs.embedding_status(doc).await.unwrap() == Some(EmbeddingStatus::Error) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("lock was not released after the operation was dropped");
    }

    #[tokio::test]
    async fn unknown_document_is_reported_as_held() {
        let docs = InMemoryDocumentStore::arc();
        let lock = LockManager::new(docs);
        assert!(!lock.acquire(DocumentId::new()).await.unwrap());
    }
}
