//! Job storage: trait plus the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docembed_core::{DocumentId, JobId, JobStatus};

use super::types::{Enqueued, Job, JobUpdate};

/// Durable job table. Pure data access, no business logic.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a fully-formed job row.
    async fn insert_job(&self, job: Job) -> Result<Job, JobStoreError>;

    /// Get a job by ID.
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// The oldest pending or processing job for a document, if any.
    async fn find_active_job(&self, document_id: DocumentId) -> Result<Option<Job>, JobStoreError>;

    /// Pending jobs ordered by `priority ASC, created_at ASC`, at most `limit`.
    async fn fetch_eligible_jobs(&self, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Apply a partial update to a job row.
    async fn update_job(&self, job_id: JobId, update: JobUpdate) -> Result<(), JobStoreError>;

    /// Count jobs created at or after `since`, grouped by status.
    async fn count_jobs_by_status_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<JobStatus, u64>, JobStoreError>;

    /// Enqueue a job for a document unless one is already active.
    ///
    /// Lookup-then-insert: two racing callers can both insert. The duplicate row
    /// is harmless because the document lock still serializes processing.
    async fn create_job(
        &self,
        document_id: DocumentId,
        priority: i32,
        max_retries: u32,
    ) -> Result<Enqueued, JobStoreError> {
        if let Some(job) = self.find_active_job(document_id).await? {
            return Ok(Enqueued { job, created: false });
        }
        let job = self.insert_job(Job::new(document_id, priority, max_retries)).await?;
        Ok(Enqueued { job, created: true })
    }
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job table lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job table lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: Job) -> Result<Job, JobStoreError> {
        let mut jobs = self.write()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read()?.get(&job_id).cloned())
    }

    async fn find_active_job(&self, document_id: DocumentId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.read()?;
        Ok(jobs
            .values()
            .filter(|j| j.document_id == document_id && j.status.is_active())
            .min_by_key(|j| (j.created_at, j.id))
            .cloned())
    }

    async fn fetch_eligible_jobs(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();

        result.sort_by_key(|j| (j.priority, j.created_at, j.id));
        result.truncate(limit);
        Ok(result)
    }

    async fn update_job(&self, job_id: JobId, update: JobUpdate) -> Result<(), JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        job.apply(&update);
        Ok(())
    }

    async fn count_jobs_by_status_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<JobStatus, u64>, JobStoreError> {
        let jobs = self.read()?;
        let mut counts = HashMap::new();
        for job in jobs.values().filter(|j| j.created_at >= since) {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn enqueue_is_idempotent_while_active() {
        let store = InMemoryJobStore::new();
        let doc = DocumentId::new();

        let first = store.create_job(doc, 0, 3).await.unwrap();
        let second = store.create_job(doc, 5, 3).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job.id, second.job.id);
        assert_eq!(second.job.priority, 0);
    }

    #[tokio::test]
    async fn terminal_job_allows_new_enqueue() {
        let store = InMemoryJobStore::new();
        let doc = DocumentId::new();

        let first = store.create_job(doc, 0, 3).await.unwrap();
        store
            .update_job(first.job.id, JobUpdate::complete(Utc::now()))
            .await
            .unwrap();

        let second = store.create_job(doc, 0, 3).await.unwrap();
        assert!(second.created);
        assert_ne!(first.job.id, second.job.id);
    }

    #[tokio::test]
    async fn eligible_jobs_sort_by_priority_then_age() {
        let store = InMemoryJobStore::new();
        let base = Utc::now() - Duration::minutes(10);

        for (i, priority) in [3, 1, 2].into_iter().enumerate() {
            let job = Job::new(DocumentId::new(), priority, 3)
                .created_at(base + Duration::seconds(i as i64));
            store.insert_job(job).await.unwrap();
        }

        let priorities: Vec<_> = store
            .fetch_eligible_jobs(10)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.priority)
            .collect();
        assert_eq!(priorities, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn equal_priority_prefers_older_job() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let newer = Job::new(DocumentId::new(), 0, 3).created_at(now);
        let older = Job::new(DocumentId::new(), 0, 3).created_at(now - Duration::hours(1));
        store.insert_job(newer.clone()).await.unwrap();
        store.insert_job(older.clone()).await.unwrap();

        let eligible = store.fetch_eligible_jobs(1).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, older.id);
    }

    #[tokio::test]
    async fn only_pending_jobs_are_eligible() {
        let store = InMemoryJobStore::new();
        let a = store.create_job(DocumentId::new(), 0, 3).await.unwrap().job;
        let b = store.create_job(DocumentId::new(), 0, 3).await.unwrap().job;
        store
            .update_job(a.id, JobUpdate::processing(Utc::now()))
            .await
            .unwrap();

        let eligible = store.fetch_eligible_jobs(10).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, b.id);
    }

    #[tokio::test]
    async fn update_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store
            .update_job(JobId::new(), JobUpdate::complete(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn counts_respect_window() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        store
            .insert_job(Job::new(DocumentId::new(), 0, 3).created_at(now - Duration::hours(30)))
            .await
            .unwrap();
        let recent = store.create_job(DocumentId::new(), 0, 3).await.unwrap().job;
        store.create_job(DocumentId::new(), 0, 3).await.unwrap();
        store
            .update_job(recent.id, JobUpdate::failed("x", now))
            .await
            .unwrap();

        let counts = store
            .count_jobs_by_status_since(now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(counts.get(&JobStatus::Pending), Some(&1));
        assert_eq!(counts.get(&JobStatus::Error), Some(&1));
        assert_eq!(counts.values().sum::<u64>(), 2);
    }
}
