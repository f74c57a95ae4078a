//! Runs one embedding job end to end.
//!
//! ```text
//! acquire lock -> job processing -> load unembedded chunks -> embed
//!   -> persist per chunk -> release lock with complete/partial/error
//!   -> job complete | requeued | error
//! ```
//!
//! Store and provider failures never escape [`JobProcessor::run`]; they are
//! folded into the job's retry bookkeeping.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use docembed_core::EmbeddingStatus;

use crate::documents::{ChunkEmbedding, DocumentStore, DocumentStoreError};
use crate::embedding::{BatchEmbedder, EmbeddingProvider};

use super::lock::{LockError, LockManager};
use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobUpdate};

/// Failure inside a locked embedding pass.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to update job: {0}")]
    Job(#[from] JobStoreError),
    #[error("failed to load chunks: {0}")]
    Chunks(#[from] DocumentStoreError),
}

/// What one pass did to a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    pub status: EmbeddingStatus,
    pub processed: usize,
    pub failed: usize,
    pub total_chunks: usize,
    pub total_tokens: u64,
    pub failed_indices: BTreeSet<usize>,
}

impl DocumentReport {
    fn nothing_to_do() -> Self {
        Self {
            status: EmbeddingStatus::Complete,
            processed: 0,
            failed: 0,
            total_chunks: 0,
            total_tokens: 0,
            failed_indices: BTreeSet::new(),
        }
    }
}

/// Result of [`JobProcessor::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Job is `complete`; the document may still be `partial` or `error`.
    Completed(DocumentReport),
    /// Job went back to `pending` for a later dispatch.
    Requeued { retry_count: u32, error: String },
    /// Job is terminally `error`.
    Failed { error: String },
    /// Document lock held elsewhere; job untouched.
    Skipped,
}

pub struct JobProcessor<S: ?Sized, D: ?Sized, P: ?Sized> {
    jobs: Arc<S>,
    documents: Arc<D>,
    lock: LockManager<D>,
    embedder: BatchEmbedder<P>,
}

impl<S, D, P> JobProcessor<S, D, P>
where
    S: JobStore + ?Sized + 'static,
    D: DocumentStore + ?Sized + 'static,
    P: EmbeddingProvider + ?Sized + 'static,
{
    pub fn new(jobs: Arc<S>, documents: Arc<D>, embedder: BatchEmbedder<P>) -> Self {
        Self {
            lock: LockManager::new(documents.clone()),
            jobs,
            documents,
            embedder,
        }
    }

    pub fn lock_manager(&self) -> &LockManager<D> {
        &self.lock
    }

    /// Process one job fetched by the dispatcher.
    pub async fn run(&self, job: &Job) -> JobOutcome {
        let started = Instant::now();
        let result = self
            .lock
            .with_lock_resolved(
                job.document_id,
                || self.embed_document(job),
                |result| match result {
                    Ok(report) => report.status,
                    Err(_) => EmbeddingStatus::Error,
                },
            )
            .await;

        match result {
            Ok(report) => {
                let outcome = self.complete(job, report).await;
                info!(
                    job_id = %job.id,
                    document_id = %job.document_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job finished"
                );
                outcome
            }
            Err(LockError::LockHeld(_)) => {
                info!(job_id = %job.id, document_id = %job.document_id, "document locked; skipping job this cycle");
                JobOutcome::Skipped
            }
            Err(LockError::Acquire(e)) => self.record_failure(job, e.to_string()).await,
            Err(LockError::Operation(e)) => self.record_failure(job, e.to_string()).await,
        }
    }

    async fn embed_document(&self, job: &Job) -> Result<DocumentReport, ProcessError> {
        let job_id = job.id;
        self.jobs
            .update_job(job_id, JobUpdate::processing(Utc::now()))
            .await?;

        let chunks = self.documents.pending_chunks(job.document_id).await?;
        if chunks.is_empty() {
            info!(job_id = %job_id, document_id = %job.document_id, "no unembedded chunks");
            return Ok(DocumentReport::nothing_to_do());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch = self.embedder.embed_batch(&texts).await;

        let model = self.embedder.model().to_string();
        let embedded_at = Utc::now();
        let mut processed = 0;
        let mut failed = batch.failed_indices.len();

        for (i, (chunk, vector)) in chunks.iter().zip(batch.embeddings).enumerate() {
            if batch.failed_indices.contains(&i) {
                continue;
            }
            let Some(embedding) = vector else {
                failed += 1;
                continue;
            };
            let record = ChunkEmbedding {
                chunk_id: chunk.id,
                embedding,
                model: model.clone(),
                embedded_at,
            };
            match self.documents.save_chunk_embedding(&record).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    warn!(job_id = %job_id, chunk_id = %chunk.id, error = %e, "failed to persist chunk embedding");
                    failed += 1;
                }
            }
        }

        let total_chunks = chunks.len();
        Ok(DocumentReport {
            status: EmbeddingStatus::from_counts(failed, total_chunks),
            processed,
            failed,
            total_chunks,
            total_tokens: batch.total_tokens,
            failed_indices: batch.failed_indices,
        })
    }

    async fn complete(&self, job: &Job, report: DocumentReport) -> JobOutcome {
        info!(
            job_id = %job.id,
            document_id = %job.document_id,
            document_status = %report.status,
            processed = report.processed,
            failed = report.failed,
            total_chunks = report.total_chunks,
            tokens = report.total_tokens,
            "embedding pass complete"
        );
        match self
            .jobs
            .update_job(job.id, JobUpdate::complete(Utc::now()))
            .await
        {
            Ok(()) => JobOutcome::Completed(report),
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to record job completion");
                self.record_failure(job, format!("failed to record completion: {e}"))
                    .await
            }
        }
    }

    /// Apply retry bookkeeping for a failed attempt of `job`.
    ///
    /// `job` must be the row as fetched for this attempt; its `retry_count`
    /// decides between requeue and terminal `error`.
    pub async fn record_failure(&self, job: &Job, error: String) -> JobOutcome {
        warn!(job_id = %job.id, document_id = %job.document_id, error = %error, "job attempt failed");

        let update = job.failure_update(error.clone(), Utc::now());
        let requeued = job.can_retry();
        if let Err(e) = self.jobs.update_job(job.id, update).await {
            error!(job_id = %job.id, error = %e, "failed to record job failure");
        }

        if requeued {
            let retry_count = job.retry_count + 1;
            info!(job_id = %job.id, retry_count, max_retries = job.max_retries, "job will retry");
            JobOutcome::Requeued { retry_count, error }
        } else {
            error!(job_id = %job.id, max_retries = job.max_retries, "job marked as error after exhausting retries");
            JobOutcome::Failed { error }
        }
    }
}
